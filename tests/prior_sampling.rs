use opisim::distributions::{Dist, Param, Transform};
use opisim::model::{is_transformed_name, untransformed_name, Model};
use opisim::prior::{CancelToken, PriorConfig, PriorSampler, SampleOutcome};
use opisim::value::Value;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Priors of the overdose model used throughout: a drift with unknown mean,
/// a log-transformed positive scale, and a deterministic yearly projection.
fn overdose_model() -> Model {
    let mut model = Model::new();
    model
        .stochastic(
            "drift",
            Dist::Normal {
                mu: Param::Const(0.0),
                sigma: Param::Const(0.5),
            },
        )
        .unwrap();
    model
        .transformed(
            "scale",
            Dist::Gamma {
                shape: Param::Const(2.0),
                scale: Param::Const(0.25),
            },
            Transform::Log,
        )
        .unwrap();
    model
        .stochastic(
            "january_shift",
            Dist::Normal {
                mu: Param::Var("drift".to_string()),
                sigma: Param::Var("scale".to_string()),
            },
        )
        .unwrap();
    model
        .deterministic("yearly_drift", &["drift"], |v| v[0].map(|x| 12.0 * x))
        .unwrap();
    model
}

fn config(draws: usize, seed: u64) -> PriorConfig {
    PriorConfig {
        draws,
        seed: Some(seed),
        progress: false,
        ..PriorConfig::default()
    }
}

#[test]
fn test_full_model_sampling() {
    let model = overdose_model();
    let mut sampler = PriorSampler::new(&model, config(200, 1)).unwrap();
    let samples = sampler.sample().unwrap();

    assert_eq!(samples.outcome(), SampleOutcome::Completed);
    for name in ["drift", "scale", "scale_log__", "january_shift", "yearly_drift"] {
        assert_eq!(samples.get(name).unwrap().len(), 200, "{}", name);
    }

    // deterministic node tracks its parent exactly, draw by draw
    let drifts = samples.get("drift").unwrap();
    let yearly = samples.get("yearly_drift").unwrap();
    for (drift, projected) in drifts.iter().zip(yearly) {
        assert_eq!(projected, &drift.map(|x| 12.0 * x));
    }

    // transformed variable: forward(untransformed) == transformed, draw by draw
    let scales = samples.get("scale").unwrap();
    let logs = samples.get("scale_log__").unwrap();
    for (scale, log) in scales.iter().zip(logs) {
        assert_eq!(log, &Transform::Log.forward_value(scale));
        // gamma support is positive
        assert!(scale.as_scalar().unwrap() > 0.0);
    }
}

#[test]
fn test_zero_draws() {
    let model = overdose_model();
    let mut sampler = PriorSampler::new(&model, config(0, 1)).unwrap();
    let samples = sampler.sample().unwrap();
    assert_eq!(samples.outcome(), SampleOutcome::Completed);
    for name in ["drift", "scale", "january_shift", "yearly_drift"] {
        assert!(samples.get(name).unwrap().is_empty());
    }
}

#[test]
fn test_cancellation_mid_run_returns_partial_results() {
    let token = CancelToken::new();
    let hook = token.clone();
    let counter = Arc::new(AtomicUsize::new(0));
    let draws_seen = counter.clone();

    let mut model = Model::new();
    model
        .stochastic(
            "x",
            Dist::Normal {
                mu: Param::Const(0.0),
                sigma: Param::Const(1.0),
            },
        )
        .unwrap();
    model
        .deterministic("watchdog", &["x"], move |v| {
            if draws_seen.fetch_add(1, Ordering::SeqCst) + 1 == 7 {
                hook.cancel();
            }
            v[0].clone()
        })
        .unwrap();

    let mut sampler = PriorSampler::new(&model, config(1000, 5)).unwrap();
    let samples = sampler.sample_with_cancel(&token).unwrap();

    assert_eq!(samples.outcome(), SampleOutcome::Cancelled { completed: 7 });
    assert_eq!(samples.get("x").unwrap().len(), 7);
    assert_eq!(samples.get("watchdog").unwrap().len(), 7);
    assert_eq!(counter.load(Ordering::SeqCst), 7);
}

#[test]
fn test_declaration_order_does_not_matter() {
    // dependent declared before its parameter source
    let mut model = Model::new();
    model
        .stochastic(
            "x",
            Dist::Normal {
                mu: Param::Var("mu".to_string()),
                sigma: Param::Const(0.0),
            },
        )
        .unwrap();
    model
        .stochastic(
            "mu",
            Dist::Uniform {
                low: Param::Const(-1.0),
                high: Param::Const(1.0),
            },
        )
        .unwrap();

    let mut sampler = PriorSampler::new(&model, config(50, 6)).unwrap();
    let samples = sampler.sample().unwrap();
    let mus = samples.get("mu").unwrap();
    let xs = samples.get("x").unwrap();
    for (mu, x) in mus.iter().zip(xs) {
        assert_eq!(x, mu);
    }
}

#[test]
fn test_batched_draws_carry_shape() {
    let model = overdose_model();
    let cfg = PriorConfig {
        size: Some(8),
        ..config(10, 3)
    };
    let mut sampler = PriorSampler::new(&model, cfg).unwrap();
    let samples = sampler.sample().unwrap();
    for value in samples.get("scale").unwrap() {
        assert_eq!(value.len(), 8);
        assert!(matches!(value, Value::Vector(_)));
    }
}

#[test]
fn test_naming_convention_round_trip() {
    let model = overdose_model();
    assert!(model.contains("scale_log__"));
    assert!(is_transformed_name("scale_log__"));
    assert_eq!(untransformed_name("scale_log__"), "scale");
    assert_eq!(model.dependencies("january_shift").unwrap(), vec!["drift", "scale"]);
    assert_eq!(
        model.basic_names(),
        vec!["drift", "scale_log__", "january_shift"]
    );
}
