// src/graph/builder.rs

//! Incremental graph construction.
//!
//! Upstreams must be registered before they are referenced, so forward
//! references (and therefore cycles) cannot be expressed at all.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::component::{Producer, Sink, Transform};
use crate::errors::GraphError;
use crate::graph::node::{StageComponent, StageNode};
use crate::graph::StreamGraph;
use crate::types::StageKind;

/// Builder for a [`StreamGraph`].
///
/// Every registration call validates immediately and returns `&mut Self` so
/// calls can be chained with `?`.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<StageNode>,
    index: HashMap<String, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_producer(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Producer>,
        parallelism: usize,
    ) -> Result<&mut Self, GraphError> {
        let no_upstreams: &[&str] = &[];
        self.add_node(
            name.into(),
            StageComponent::Producer(component),
            parallelism,
            no_upstreams,
        )
    }

    pub fn add_transform<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Transform>,
        parallelism: usize,
        upstreams: &[S],
    ) -> Result<&mut Self, GraphError> {
        self.add_node(
            name.into(),
            StageComponent::Transform(component),
            parallelism,
            upstreams,
        )
    }

    pub fn add_sink<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Sink>,
        parallelism: usize,
        upstreams: &[S],
    ) -> Result<&mut Self, GraphError> {
        self.add_node(
            name.into(),
            StageComponent::Sink(component),
            parallelism,
            upstreams,
        )
    }

    /// Register an already-tagged component.
    pub fn add_stage<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        component: StageComponent,
        parallelism: usize,
        upstreams: &[S],
    ) -> Result<&mut Self, GraphError> {
        self.add_node(name.into(), component, parallelism, upstreams)
    }

    /// Attach the settings table passed to the stage's `prepare`.
    pub fn configure(
        &mut self,
        name: &str,
        settings: toml::Table,
    ) -> Result<&mut Self, GraphError> {
        let node = self.node_mut(name)?;
        node.settings = settings;
        Ok(self)
    }

    /// Override the capacity of the stage's input channel.
    pub fn set_queue_capacity(
        &mut self,
        name: &str,
        capacity: usize,
    ) -> Result<&mut Self, GraphError> {
        if capacity == 0 {
            return Err(GraphError::InvalidQueueCapacity {
                stage: name.to_string(),
                capacity,
            });
        }
        let node = self.node_mut(name)?;
        node.queue_capacity = Some(capacity);
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finalize: check global invariants and compute downstream sets.
    pub fn build(self) -> Result<StreamGraph, GraphError> {
        let Self { mut nodes, index } = self;

        if !nodes.iter().any(|n| n.kind() == StageKind::Producer) {
            return Err(GraphError::NoProducers);
        }

        for node in &nodes {
            if node.kind() != StageKind::Producer && node.upstreams.is_empty() {
                return Err(GraphError::MissingUpstream(node.name.clone()));
            }
        }

        let mut downstreams: Vec<Vec<String>> = vec![Vec::new(); nodes.len()];
        for node in &nodes {
            for upstream in &node.upstreams {
                let idx = index[upstream];
                downstreams[idx].push(node.name.clone());
            }
        }
        for (node, downs) in nodes.iter_mut().zip(downstreams) {
            node.downstreams = downs;
        }

        for node in &nodes {
            if node.kind() != StageKind::Sink && node.downstreams.is_empty() {
                warn!(
                    stage = %node.name,
                    kind = %node.kind(),
                    "stage has no downstream; its output will be discarded"
                );
            }
        }

        Ok(StreamGraph::new(nodes, index))
    }

    fn add_node<S: AsRef<str>>(
        &mut self,
        name: String,
        component: StageComponent,
        parallelism: usize,
        upstreams: &[S],
    ) -> Result<&mut Self, GraphError> {
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        if parallelism == 0 {
            return Err(GraphError::InvalidParallelism {
                stage: name,
                parallelism,
            });
        }

        let kind = component.kind();
        if kind == StageKind::Producer && !upstreams.is_empty() {
            return Err(GraphError::UnexpectedUpstream(name));
        }
        if kind != StageKind::Producer && upstreams.is_empty() {
            return Err(GraphError::MissingUpstream(name));
        }

        // Upstreams are a set: repeated names collapse to one edge.
        let mut resolved: Vec<String> = Vec::with_capacity(upstreams.len());
        for upstream in upstreams {
            let upstream = upstream.as_ref();
            let Some(&idx) = self.index.get(upstream) else {
                return Err(GraphError::UnknownUpstream {
                    stage: name,
                    upstream: upstream.to_string(),
                });
            };
            if self.nodes[idx].kind() == StageKind::Sink {
                return Err(GraphError::SinkAsUpstream {
                    stage: name,
                    upstream: upstream.to_string(),
                });
            }
            if !resolved.iter().any(|u| u == upstream) {
                resolved.push(upstream.to_string());
            }
        }

        debug!(
            stage = %name,
            kind = %kind,
            parallelism,
            upstreams = ?resolved,
            "registered stage"
        );

        self.index.insert(name.clone(), self.nodes.len());
        self.nodes
            .push(StageNode::new(name, component, parallelism, resolved));
        Ok(self)
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut StageNode, GraphError> {
        match self.index.get(name) {
            Some(&idx) => Ok(&mut self.nodes[idx]),
            None => Err(GraphError::UnknownStage(name.to_string())),
        }
    }
}
