// src/graph/snapshot.rs

//! Read-only copy of the graph topology handed to observers.

use crate::types::StageKind;

/// One directed edge: units flow from `upstream` into `downstream`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub upstream: String,
    pub downstream: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
    pub parallelism: usize,
    pub upstreams: Vec<String>,
    pub downstreams: Vec<String>,
}

/// Topology of a frozen graph, stages in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub stages: Vec<StageDescriptor>,
}

impl GraphSnapshot {
    pub fn stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn edges(&self) -> Vec<GraphEdge> {
        self.stages
            .iter()
            .flat_map(|stage| {
                stage.upstreams.iter().map(move |up| GraphEdge {
                    upstream: up.clone(),
                    downstream: stage.name.clone(),
                })
            })
            .collect()
    }

    pub fn stages_of_kind(&self, kind: StageKind) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter().filter(move |s| s.kind == kind)
    }
}
