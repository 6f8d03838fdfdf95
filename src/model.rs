//! Probabilistic model representation.
//!
//! A [`Model`] is an insertion-ordered collection of named nodes. Each node
//! is a basic random variable (optionally registered under a transformed
//! name) or a deterministic function of other named nodes. The dependency
//! graph over produced names is validated and topologically ordered at
//! construction time, so samplers always resolve dependencies strictly
//! before dependents regardless of declaration order.

use std::collections::HashMap;
use std::fmt;

use crate::distributions::{Dist, Transform};
use crate::value::Value;

/// Pure function evaluated by substituting the current values of the node's
/// named inputs, in declaration order.
pub type DeterministicFn = Box<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A single named node in the model.
pub enum Node {
    /// Basic random variable with a prior distribution.
    Stochastic { dist: Dist },

    /// Basic random variable registered under a transformed name. One draw
    /// produces both the untransformed value (under the untransformed name)
    /// and its forward-transformed counterpart (under the transformed name).
    Transformed { dist: Dist, transform: Transform },

    /// Pure function of other named nodes, no intrinsic randomness.
    Deterministic {
        inputs: Vec<String>,
        func: DeterministicFn,
    },
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Stochastic { dist } => f.debug_struct("Stochastic").field("dist", dist).finish(),
            Node::Transformed { dist, transform } => f
                .debug_struct("Transformed")
                .field("dist", dist)
                .field("transform", transform)
                .finish(),
            Node::Deterministic { inputs, .. } => f
                .debug_struct("Deterministic")
                .field("inputs", inputs)
                .finish_non_exhaustive(),
        }
    }
}

pub(crate) struct NamedNode {
    /// Registered name: the transformed name for `Node::Transformed`, the
    /// plain name otherwise.
    pub name: String,
    pub node: Node,
}

/// Errors raised while building or validating a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate variable name: {0}")]
    DuplicateName(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("`{node}` depends on unknown variable `{dependency}`")]
    UnknownDependency { node: String, dependency: String },

    #[error("dependency cycle involving: {0}")]
    DependencyCycle(String),
}

/// Suffix convention for transformed names: `{base}_{transform}__`.
pub fn transformed_name(base: &str, transform: Transform) -> String {
    format!("{}_{}__", base, transform.name())
}

/// Whether a name follows the transformed-name convention.
pub fn is_transformed_name(name: &str) -> bool {
    name.ends_with("__") && name.trim_end_matches("__").contains('_')
}

/// Strip the transform suffix from a transformed name.
///
/// Returns the name unchanged if it does not follow the convention.
pub fn untransformed_name(name: &str) -> &str {
    if !is_transformed_name(name) {
        return name;
    }
    let stem = &name[..name.len() - 2];
    match stem.rfind('_') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// An insertion-ordered probabilistic model.
#[derive(Default)]
pub struct Model {
    nodes: Vec<NamedNode>,
    /// Produced name -> node index. A transformed node appears twice, under
    /// both its untransformed and transformed names.
    index: HashMap<String, usize>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a basic random variable.
    pub fn stochastic(&mut self, name: impl Into<String>, dist: Dist) -> Result<&mut Self, ModelError> {
        let name = name.into();
        self.claim(&name)?;
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(NamedNode {
            name,
            node: Node::Stochastic { dist },
        });
        Ok(self)
    }

    /// Add a basic random variable registered under the transformed name
    /// derived from `base` and `transform`. Both the untransformed and the
    /// transformed name become addressable variables.
    pub fn transformed(
        &mut self,
        base: impl Into<String>,
        dist: Dist,
        transform: Transform,
    ) -> Result<&mut Self, ModelError> {
        let base = base.into();
        let registered = transformed_name(&base, transform);
        self.claim(&base)?;
        self.claim(&registered)?;
        let idx = self.nodes.len();
        self.index.insert(base, idx);
        self.index.insert(registered.clone(), idx);
        self.nodes.push(NamedNode {
            name: registered,
            node: Node::Transformed { dist, transform },
        });
        Ok(self)
    }

    /// Add a deterministic node computed from the named `inputs`.
    pub fn deterministic(
        &mut self,
        name: impl Into<String>,
        inputs: &[&str],
        func: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Result<&mut Self, ModelError> {
        let name = name.into();
        self.claim(&name)?;
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(NamedNode {
            name,
            node: Node::Deterministic {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                func: Box::new(func),
            },
        });
        Ok(self)
    }

    fn claim(&self, name: &str) -> Result<(), ModelError> {
        if self.index.contains_key(name) {
            return Err(ModelError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All produced variable names in declaration order. A transformed node
    /// yields its untransformed name first, then its transformed name.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.nodes.len());
        for named in &self.nodes {
            if matches!(named.node, Node::Transformed { .. }) {
                names.push(untransformed_name(&named.name));
            }
            names.push(named.name.as_str());
        }
        names
    }

    /// Registered names of the basic (non-deterministic) variables, in
    /// declaration order.
    pub fn basic_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| !matches!(n.node, Node::Deterministic { .. }))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// The node producing a variable. For a transformed variable both the
    /// untransformed and the transformed name resolve to the same node,
    /// which carries the untransformed distribution and the forward
    /// transform.
    pub fn node(&self, name: &str) -> Result<&Node, ModelError> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| ModelError::UnknownVariable(name.to_string()))?;
        Ok(&self.nodes[idx].node)
    }

    /// Direct named dependencies of an arbitrary node.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&str>, ModelError> {
        Ok(match self.node(name)? {
            Node::Stochastic { dist } | Node::Transformed { dist, .. } => dist.dependencies(),
            Node::Deterministic { inputs, .. } => inputs.iter().map(String::as_str).collect(),
        })
    }

    pub(crate) fn node_at(&self, idx: usize) -> &NamedNode {
        &self.nodes[idx]
    }

    /// Topological order over node indices (Kahn's algorithm), computed once
    /// per sampler construction. Declaration order is preserved among nodes
    /// whose dependencies are already satisfied.
    pub(crate) fn topological_order(&self) -> Result<Vec<usize>, ModelError> {
        let n = self.nodes.len();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for (idx, named) in self.nodes.iter().enumerate() {
            for dep in self.dependencies(&named.name)? {
                let dep_idx = *self.index.get(dep).ok_or_else(|| {
                    ModelError::UnknownDependency {
                        node: named.name.clone(),
                        dependency: dep.to_string(),
                    }
                })?;
                if dep_idx == idx {
                    return Err(ModelError::DependencyCycle(named.name.clone()));
                }
                if !dependents[dep_idx].contains(&idx) {
                    dependents[dep_idx].push(idx);
                    in_degree[idx] += 1;
                }
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut cursor = 0;
        while cursor < ready.len() {
            let idx = ready[cursor];
            cursor += 1;
            order.push(idx);
            for &dep in &dependents[idx] {
                in_degree[dep] -= 1;
                if in_degree[dep] == 0 {
                    ready.push(dep);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i].name.as_str())
                .collect();
            return Err(ModelError::DependencyCycle(stuck.join(", ")));
        }
        Ok(order)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("names", &self.names()).finish()
    }
}
