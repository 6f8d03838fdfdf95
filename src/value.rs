//! Sampled values and draw-time errors.
//!
//! A [`Value`] is what one distribution draw (or one deterministic
//! evaluation) produces within a single joint draw. A [`Point`] is the
//! mapping from variable name to `Value` for one draw; it is discarded once
//! folded into the output collection.

use std::collections::HashMap;

/// One full joint assignment, valid for a single draw.
pub type Point = HashMap<String, Value>;

/// A per-draw sampled value.
///
/// `Vector` is produced when a batch size is requested, in which case a
/// single step draws that many i.i.d. values at once.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    /// Extract the scalar payload.
    pub fn as_scalar(&self) -> Result<f64, SampleError> {
        match self {
            Value::Scalar(x) => Ok(*x),
            Value::Vector(v) => Err(SampleError::NotScalar(v.len())),
        }
    }

    /// Number of elements carried (1 for a scalar).
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` elementwise, preserving shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(*x)),
            Value::Vector(v) => Value::Vector(v.iter().map(|x| f(*x)).collect()),
        }
    }

    /// All elements as a flat vector.
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(x) => vec![*x],
            Value::Vector(v) => v.clone(),
        }
    }
}

/// Errors surfaced while drawing from the prior.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    /// A node needed a value not yet present in the current draw. Fatal to
    /// the draw; cannot occur for a model whose dependency graph passed
    /// topological ordering.
    #[error("unresolved dependency: no value for `{0}` in the current draw")]
    UnresolvedDependency(String),

    /// A distribution rejected its resolved parameters. The underlying
    /// message is carried verbatim.
    #[error("invalid {dist} parameters: {message}")]
    InvalidParameters { dist: &'static str, message: String },

    /// A scalar was required (e.g. as a distribution parameter) but the
    /// point held a batch of values.
    #[error("expected a scalar value, found a vector of length {0}")]
    NotScalar(usize),
}
