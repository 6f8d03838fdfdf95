//! Prior distributions and value transforms.
//!
//! A distribution parameter is either a constant or a reference to an
//! already-resolved variable in the current draw, which is what makes
//! stochastic-on-stochastic dependencies explicit and sortable. Sampling
//! delegates to `rand_distr`; constructor rejections are carried verbatim
//! as [`SampleError::InvalidParameters`].

use rand::distributions::Uniform;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Beta, Binomial, Distribution, Exp, Gamma, LogNormal, Normal};
use serde::{Deserialize, Serialize};

use crate::value::{Point, SampleError, Value};

/// A distribution parameter: a fixed constant or the current value of
/// another named variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    Const(f64),
    Var(String),
}

impl Param {
    /// Resolve against the current point. Referenced variables must already
    /// hold a scalar value.
    pub fn resolve(&self, point: &Point) -> Result<f64, SampleError> {
        self.value(point)?.as_scalar()
    }

    /// Resolve against the current point, keeping the stored shape.
    pub fn value(&self, point: &Point) -> Result<Value, SampleError> {
        match self {
            Param::Const(x) => Ok(Value::Scalar(*x)),
            Param::Var(name) => point
                .get(name)
                .cloned()
                .ok_or_else(|| SampleError::UnresolvedDependency(name.clone())),
        }
    }

    fn var_name(&self) -> Option<&str> {
        match self {
            Param::Const(_) => None,
            Param::Var(name) => Some(name),
        }
    }
}

/// A prior distribution over one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dist {
    Normal { mu: Param, sigma: Param },
    LogNormal { mu: Param, sigma: Param },
    Uniform { low: Param, high: Param },
    Exponential { rate: Param },
    Gamma { shape: Param, scale: Param },
    Beta { alpha: Param, beta: Param },
    Binomial { n: Param, p: Param },
}

impl Dist {
    /// Names of the variables this distribution's parameters reference.
    pub fn dependencies(&self) -> Vec<&str> {
        let params: Vec<&Param> = match self {
            Dist::Normal { mu, sigma } | Dist::LogNormal { mu, sigma } => vec![mu, sigma],
            Dist::Uniform { low, high } => vec![low, high],
            Dist::Exponential { rate } => vec![rate],
            Dist::Gamma { shape, scale } => vec![shape, scale],
            Dist::Beta { alpha, beta } => vec![alpha, beta],
            Dist::Binomial { n, p } => vec![n, p],
        };
        let mut deps: Vec<&str> = params.into_iter().filter_map(Param::var_name).collect();
        deps.dedup();
        deps
    }

    /// Draw from this distribution conditioned on the current point.
    ///
    /// With `size = Some(k)` the step produces `k` i.i.d. values at once
    /// (a `Value::Vector`). Parameters that resolve to batched values are
    /// broadcast elementwise against scalars; mismatched batch lengths are
    /// rejected.
    pub fn random(
        &self,
        point: &Point,
        size: Option<usize>,
        rng: &mut ChaCha20Rng,
    ) -> Result<Value, SampleError> {
        match self {
            Dist::Normal { mu, sigma } => sample_broadcast(
                "Normal",
                &[mu.value(point)?, sigma.value(point)?],
                size,
                rng,
                |p, rng| {
                    Normal::new(p[0], p[1])
                        .map(|d| d.sample(rng))
                        .map_err(|e| invalid("Normal", e))
                },
            ),
            Dist::LogNormal { mu, sigma } => sample_broadcast(
                "LogNormal",
                &[mu.value(point)?, sigma.value(point)?],
                size,
                rng,
                |p, rng| {
                    LogNormal::new(p[0], p[1])
                        .map(|d| d.sample(rng))
                        .map_err(|e| invalid("LogNormal", e))
                },
            ),
            Dist::Uniform { low, high } => sample_broadcast(
                "Uniform",
                &[low.value(point)?, high.value(point)?],
                size,
                rng,
                |p, rng| {
                    if !(p[0] < p[1]) {
                        return Err(SampleError::InvalidParameters {
                            dist: "Uniform",
                            message: format!("low ({}) must be below high ({})", p[0], p[1]),
                        });
                    }
                    Ok(Uniform::new(p[0], p[1]).sample(rng))
                },
            ),
            Dist::Exponential { rate } => {
                sample_broadcast("Exponential", &[rate.value(point)?], size, rng, |p, rng| {
                    Exp::new(p[0])
                        .map(|d| d.sample(rng))
                        .map_err(|e| invalid("Exponential", e))
                })
            }
            Dist::Gamma { shape, scale } => sample_broadcast(
                "Gamma",
                &[shape.value(point)?, scale.value(point)?],
                size,
                rng,
                |p, rng| {
                    Gamma::new(p[0], p[1])
                        .map(|d| d.sample(rng))
                        .map_err(|e| invalid("Gamma", e))
                },
            ),
            Dist::Beta { alpha, beta } => sample_broadcast(
                "Beta",
                &[alpha.value(point)?, beta.value(point)?],
                size,
                rng,
                |p, rng| {
                    Beta::new(p[0], p[1])
                        .map(|d| d.sample(rng))
                        .map_err(|e| invalid("Beta", e))
                },
            ),
            Dist::Binomial { n, p } => sample_broadcast(
                "Binomial",
                &[n.value(point)?, p.value(point)?],
                size,
                rng,
                |params, rng| {
                    Binomial::new(params[0].round() as u64, params[1])
                        .map(|d| d.sample(rng) as f64)
                        .map_err(|e| invalid("Binomial", e))
                },
            ),
        }
    }
}

fn invalid(dist: &'static str, err: impl std::fmt::Display) -> SampleError {
    SampleError::InvalidParameters {
        dist,
        message: err.to_string(),
    }
}

/// Draw once per output element, resolving each parameter elementwise.
///
/// The output length is the requested batch size if given, otherwise the
/// common length of any batched parameters; all scalars yields a scalar.
fn sample_broadcast(
    dist: &'static str,
    params: &[Value],
    size: Option<usize>,
    rng: &mut ChaCha20Rng,
    draw_one: impl Fn(&[f64], &mut ChaCha20Rng) -> Result<f64, SampleError>,
) -> Result<Value, SampleError> {
    let mut batch_len: Option<usize> = None;
    for param in params {
        if let Value::Vector(v) = param {
            match batch_len {
                None => batch_len = Some(v.len()),
                Some(n) if n == v.len() => {}
                Some(n) => {
                    return Err(SampleError::InvalidParameters {
                        dist,
                        message: format!("parameter batch lengths differ: {} vs {}", n, v.len()),
                    })
                }
            }
        }
    }
    if let (Some(requested), Some(n)) = (size, batch_len) {
        if requested != n {
            return Err(SampleError::InvalidParameters {
                dist,
                message: format!(
                    "parameter batch length {} does not match requested size {}",
                    n, requested
                ),
            });
        }
    }

    match size.or(batch_len) {
        None => {
            let scalars: Vec<f64> = params
                .iter()
                .map(Value::as_scalar)
                .collect::<Result<_, _>>()?;
            Ok(Value::Scalar(draw_one(&scalars, rng)?))
        }
        Some(n) => {
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let scalars: Vec<f64> = params.iter().map(|p| element(p, i)).collect();
                out.push(draw_one(&scalars, rng)?);
            }
            Ok(Value::Vector(out))
        }
    }
}

fn element(value: &Value, i: usize) -> f64 {
    match value {
        Value::Scalar(x) => *x,
        Value::Vector(v) => v[i],
    }
}

/// Forward transform from a constrained draw into unconstrained space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    /// For positive-support variables.
    Log,
    /// For (0,1)-support variables.
    Logit,
}

impl Transform {
    /// Suffix fragment used by the transformed-name convention.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Log => "log",
            Transform::Logit => "logit",
        }
    }

    pub fn forward(&self, x: f64) -> f64 {
        match self {
            Transform::Log => x.ln(),
            Transform::Logit => logit(x),
        }
    }

    /// Elementwise forward transform, preserving shape.
    pub fn forward_value(&self, value: &Value) -> Value {
        value.map(|x| self.forward(x))
    }
}

/// Log-odds of a probability.
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Logistic (inverse-logit) function. Maps any finite input into (0,1).
pub fn expit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng(seed: u64) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(seed)
    }

    #[test]
    fn test_param_resolution() {
        let mut point = Point::new();
        point.insert("mu".to_string(), Value::Scalar(1.5));

        assert_eq!(Param::Const(2.0).resolve(&point).unwrap(), 2.0);
        assert_eq!(Param::Var("mu".to_string()).resolve(&point).unwrap(), 1.5);
        assert_eq!(
            Param::Var("missing".to_string()).resolve(&point),
            Err(SampleError::UnresolvedDependency("missing".to_string()))
        );
    }

    #[test]
    fn test_dependencies() {
        let dist = Dist::Normal {
            mu: Param::Var("drift".to_string()),
            sigma: Param::Const(1.0),
        };
        assert_eq!(dist.dependencies(), vec!["drift"]);

        let dist = Dist::Gamma {
            shape: Param::Const(0.5),
            scale: Param::Const(300.0),
        };
        assert!(dist.dependencies().is_empty());
    }

    #[test]
    fn test_seeded_draws_reproducible() {
        let dist = Dist::Normal {
            mu: Param::Const(0.0),
            sigma: Param::Const(1.0),
        };
        let point = Point::new();
        let a = dist.random(&point, Some(10), &mut rng(7)).unwrap();
        let b = dist.random(&point, Some(10), &mut rng(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_size() {
        let dist = Dist::Exponential {
            rate: Param::Const(2.0),
        };
        let point = Point::new();
        let v = dist.random(&point, Some(5), &mut rng(0)).unwrap();
        assert_eq!(v.len(), 5);
        let s = dist.random(&point, None, &mut rng(0)).unwrap();
        assert!(matches!(s, Value::Scalar(_)));
    }

    #[test]
    fn test_binomial_bounds() {
        let dist = Dist::Binomial {
            n: Param::Const(100.0),
            p: Param::Const(0.3),
        };
        let point = Point::new();
        for x in dist.random(&point, Some(50), &mut rng(3)).unwrap().to_vec() {
            assert!((0.0..=100.0).contains(&x));
            assert_eq!(x, x.round());
        }
    }

    #[test]
    fn test_vector_parameters_broadcast_elementwise() {
        let mut point = Point::new();
        point.insert("mu".to_string(), Value::Vector(vec![0.0, 100.0]));
        let dist = Dist::Normal {
            mu: Param::Var("mu".to_string()),
            sigma: Param::Const(0.0),
        };
        // sigma = 0 collapses each draw onto its per-element mean
        let v = dist.random(&point, None, &mut rng(1)).unwrap();
        assert_eq!(v, Value::Vector(vec![0.0, 100.0]));
    }

    #[test]
    fn test_mismatched_batch_lengths_rejected() {
        let mut point = Point::new();
        point.insert("mu".to_string(), Value::Vector(vec![0.0, 1.0]));
        point.insert("sigma".to_string(), Value::Vector(vec![1.0, 1.0, 1.0]));
        let dist = Dist::Normal {
            mu: Param::Var("mu".to_string()),
            sigma: Param::Var("sigma".to_string()),
        };
        assert!(matches!(
            dist.random(&point, None, &mut rng(1)),
            Err(SampleError::InvalidParameters { dist: "Normal", .. })
        ));
        assert!(dist.random(&point, Some(4), &mut rng(1)).is_err());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let point = Point::new();

        let dist = Dist::Normal {
            mu: Param::Const(0.0),
            sigma: Param::Const(-1.0),
        };
        assert!(matches!(
            dist.random(&point, None, &mut rng(0)),
            Err(SampleError::InvalidParameters { dist: "Normal", .. })
        ));

        let dist = Dist::Uniform {
            low: Param::Const(2.0),
            high: Param::Const(1.0),
        };
        assert!(dist.random(&point, None, &mut rng(0)).is_err());
    }

    #[test]
    fn test_transform_forward() {
        assert_eq!(Transform::Log.forward(1.0), 0.0);
        assert!((Transform::Logit.forward(0.5)).abs() < 1e-12);
        assert_eq!(Transform::Log.name(), "log");
    }

    #[test]
    fn test_logit_expit_inverse() {
        for &p in &[0.01, 0.25, 0.5, 0.75, 0.99] {
            assert!((expit(logit(p)) - p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_expit_in_unit_interval() {
        for &x in &[-30.0, -5.0, 0.0, 5.0, 30.0] {
            let y = expit(x);
            assert!(y > 0.0 && y < 1.0);
        }
    }
}
