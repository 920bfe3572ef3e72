// src/graph/mod.rs

//! Stage graph representation.
//!
//! - [`builder`] registers stages one by one and validates as it goes.
//! - [`node`] holds a single stage: component, parallelism, wiring.
//! - [`snapshot`] is the immutable topology view given to observers.

pub mod builder;
pub mod node;
pub mod snapshot;

use std::collections::HashMap;

pub use builder::GraphBuilder;
pub use node::{StageComponent, StageNode};
pub use snapshot::{GraphEdge, GraphSnapshot, StageDescriptor};

use crate::types::StageKind;

/// A validated, frozen stage graph.
///
/// Stages are kept in registration order, which is also a topological order
/// because upstreams must exist before they are referenced.
#[derive(Debug, Clone)]
pub struct StreamGraph {
    nodes: Vec<StageNode>,
    index: HashMap<String, usize>,
}

impl StreamGraph {
    pub(crate) fn new(nodes: Vec<StageNode>, index: HashMap<String, usize>) -> Self {
        Self { nodes, index }
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn nodes(&self) -> &[StageNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&StageNode> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of all stages, in registration order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name())
    }

    /// Total number of producer workers across all producer stages.
    pub fn producer_workers(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind() == StageKind::Producer)
            .map(|n| n.parallelism())
            .sum()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            stages: self
                .nodes
                .iter()
                .map(|n| StageDescriptor {
                    name: n.name().to_string(),
                    kind: n.kind(),
                    parallelism: n.parallelism(),
                    upstreams: n.upstreams().to_vec(),
                    downstreams: n.downstreams().to_vec(),
                })
                .collect(),
        }
    }
}
