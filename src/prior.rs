//! Prior-predictive sampling.
//!
//! [`PriorSampler`] walks a model's dependency graph in a topological order
//! computed once at construction and draws joint samples from the prior.
//! Each sampler owns its `ChaCha20Rng`; no global generator state is ever
//! touched. Cancellation is cooperative: a [`CancelToken`] is checked
//! between draws, and a cancelled run returns its partial results as
//! success.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::model::{untransformed_name, Model, ModelError, Node};
use crate::progress::Progress;
use crate::value::{Point, SampleError, Value};

/// Configuration for a prior-sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorConfig {
    /// Number of joint draws from the prior.
    pub draws: usize,

    /// Variables to collect. Defaults to every named variable in the model.
    pub vars: Option<Vec<String>>,

    /// i.i.d. values produced by each distribution call within one draw.
    pub size: Option<usize>,

    /// Seed for the sampler's own generator. `None` seeds from OS entropy.
    pub seed: Option<u64>,

    /// Whether to render the stderr progress indicator.
    pub progress: bool,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            draws: 500,
            vars: None,
            size: None,
            seed: None,
            progress: true,
        }
    }
}

/// Cooperative cancellation flag, checked between draws. Cloneable and safe
/// to set from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a sampling run ended. Both variants carry usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// All requested draws completed.
    Completed,
    /// Cancelled after `completed` draws; sequences have exactly that length.
    Cancelled { completed: usize },
}

/// Per-variable prior sample sequences, insertion order = draw order.
#[derive(Debug)]
pub struct PriorSamples {
    values: HashMap<String, Vec<Value>>,
    completed: usize,
    outcome: SampleOutcome,
}

impl PriorSamples {
    /// Sample sequence for one requested variable.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn values(&self) -> &HashMap<String, Vec<Value>> {
        &self.values
    }

    /// Number of completed draws (the length of every sequence).
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn outcome(&self) -> SampleOutcome {
        self.outcome
    }
}

/// Draws joint samples from the prior of a model.
#[derive(Debug)]
pub struct PriorSampler<'m> {
    model: &'m Model,
    order: Vec<usize>,
    vars: Vec<String>,
    cfg: PriorConfig,
    rng: ChaCha20Rng,
}

impl<'m> PriorSampler<'m> {
    /// Validate the requested variables and compute the topological order.
    pub fn new(model: &'m Model, cfg: PriorConfig) -> Result<Self, ModelError> {
        let order = model.topological_order()?;
        let vars: Vec<String> = match &cfg.vars {
            Some(requested) => {
                for name in requested {
                    if !model.contains(name) {
                        return Err(ModelError::UnknownVariable(name.clone()));
                    }
                }
                requested.clone()
            }
            None => model.names().into_iter().map(String::from).collect(),
        };
        let rng = match cfg.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        Ok(Self {
            model,
            order,
            vars,
            cfg,
            rng,
        })
    }

    /// Run the configured number of draws to completion.
    pub fn sample(&mut self) -> Result<PriorSamples, SampleError> {
        self.sample_with_cancel(&CancelToken::new())
    }

    /// Run draws until the count is reached or `cancel` is set. Cancellation
    /// is not an error: accumulated sequences are returned as success with
    /// outcome [`SampleOutcome::Cancelled`].
    pub fn sample_with_cancel(&mut self, cancel: &CancelToken) -> Result<PriorSamples, SampleError> {
        let mut buffers: HashMap<String, Vec<Value>> = self
            .vars
            .iter()
            .map(|name| (name.clone(), Vec::with_capacity(self.cfg.draws)))
            .collect();

        let mut progress = Progress::new(self.cfg.draws, self.cfg.progress);
        let mut completed = 0;
        for _ in 0..self.cfg.draws {
            if cancel.is_cancelled() {
                break;
            }
            let point = self.step()?;
            for name in &self.vars {
                let value = point
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SampleError::UnresolvedDependency(name.clone()))?;
                buffers
                    .get_mut(name)
                    .ok_or_else(|| SampleError::UnresolvedDependency(name.clone()))?
                    .push(value);
            }
            completed += 1;
            progress.inc();
        }
        progress.finish();

        let outcome = if completed == self.cfg.draws {
            SampleOutcome::Completed
        } else {
            SampleOutcome::Cancelled { completed }
        };
        Ok(PriorSamples {
            values: buffers,
            completed,
            outcome,
        })
    }

    /// Produce one full joint assignment in dependency order.
    fn step(&mut self) -> Result<Point, SampleError> {
        let mut point = Point::new();
        for &idx in &self.order {
            let named = self.model.node_at(idx);
            match &named.node {
                Node::Stochastic { dist } => {
                    let value = dist.random(&point, self.cfg.size, &mut self.rng)?;
                    point.insert(named.name.clone(), value);
                }
                Node::Transformed { dist, transform } => {
                    let value = dist.random(&point, self.cfg.size, &mut self.rng)?;
                    let forward = transform.forward_value(&value);
                    point.insert(untransformed_name(&named.name).to_string(), value);
                    point.insert(named.name.clone(), forward);
                }
                Node::Deterministic { inputs, func } => {
                    let resolved = inputs
                        .iter()
                        .map(|input| {
                            point
                                .get(input)
                                .cloned()
                                .ok_or_else(|| SampleError::UnresolvedDependency(input.clone()))
                        })
                        .collect::<Result<Vec<Value>, SampleError>>()?;
                    point.insert(named.name.clone(), func(&resolved));
                }
            }
        }
        Ok(point)
    }
}

// =============================================================================
// Tests
// =============================================================================
