//! Execution plans.
//!
//! A [`Plan`] is a validated DAG of [`PlanNode`]s. Each node names the nodes
//! it depends on and carries the surface it works on; the scheduler starts a
//! node only once every dependency has succeeded.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use meridian_surface::{ScopeTouches, Surface};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ways a plan can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A node has an empty name.
    #[error("plan node at index {0} has an empty name")]
    EmptyNodeName(usize),
    /// Two nodes share a name.
    #[error("duplicate plan node '{0}'")]
    DuplicateNode(String),
    /// A dependency names a node that is not in the plan.
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency {
        /// The dependent node.
        node: String,
        /// The missing dependency.
        dependency: String,
    },
    /// Dependencies form a cycle.
    #[error("dependency cycle involving {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    /// Unique name; also the node's circuit breaker and metrics key.
    pub name: String,
    /// Surface the node works on.
    pub surface: Surface,
    /// Names of nodes that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Layers the node's change affects.
    #[serde(default)]
    pub scope_touches: ScopeTouches,
}

impl PlanNode {
    /// Creates a node with no dependencies that touches only its surface.
    #[must_use]
    pub fn new(name: impl Into<String>, surface: Surface) -> Self {
        Self {
            name: name.into(),
            surface,
            depends_on: Vec::new(),
            scope_touches: ScopeTouches::from_surfaces([surface]),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// Replaces the scope-touches record.
    #[must_use]
    pub fn with_scope_touches(mut self, touches: ScopeTouches) -> Self {
        self.scope_touches = touches;
        self
    }
}

/// A validated, acyclic set of nodes.
#[derive(Debug, Clone)]
pub struct Plan {
    nodes: Vec<PlanNode>,
    index: HashMap<String, usize>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl Plan {
    /// Validates `nodes` and builds the plan.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] for empty or duplicate names, dependencies on
    /// unknown nodes, and cycles.
    pub fn new(nodes: Vec<PlanNode>) -> Result<Self, PlanError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node.name.trim().is_empty() {
                return Err(PlanError::EmptyNodeName(i));
            }
            if index.insert(node.name.clone(), i).is_some() {
                return Err(PlanError::DuplicateNode(node.name.clone()));
            }
        }

        let mut dependents = vec![Vec::new(); nodes.len()];
        let mut in_degree = vec![0_usize; nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for dependency in &node.depends_on {
                let Some(&dep) = index.get(dependency) else {
                    return Err(PlanError::UnknownDependency {
                        node: node.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if seen.insert(dep) {
                    dependents[dep].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        // Kahn's algorithm; whatever is left unvisited sits on a cycle.
        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());
        let mut remaining = in_degree;
        while let Some(i) = ready.pop_front() {
            order.push(i);
            for &next in &dependents[i] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        if order.len() != nodes.len() {
            let mut stuck: Vec<String> = (0..nodes.len())
                .filter(|&i| remaining[i] > 0)
                .map(|i| nodes[i].name.clone())
                .collect();
            stuck.sort();
            return Err(PlanError::Cycle(stuck));
        }

        Ok(Self {
            nodes,
            index,
            dependents,
            order,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` for a plan without nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&PlanNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Nodes in an order where every node follows its dependencies.
    pub fn topological_order(&self) -> impl Iterator<Item = &PlanNode> {
        self.order.iter().map(|&i| &self.nodes[i])
    }

    /// Nodes that list `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &PlanNode> {
        self.index
            .get(name)
            .map(|&i| self.dependents[i].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&i| &self.nodes[i])
    }

    pub(crate) fn dependent_indices(&self, i: usize) -> &[usize] {
        &self.dependents[i]
    }

    pub(crate) fn dependency_count(&self, i: usize) -> usize {
        let mut seen = HashSet::new();
        self.nodes[i]
            .depends_on
            .iter()
            .filter(|dep| seen.insert(dep.as_str()))
            .count()
    }
}
