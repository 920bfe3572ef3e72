// src/graph/node.rs

//! Stage nodes: a named component plus its parallelism and wiring.

use std::fmt;
use std::sync::Arc;

use crate::component::{PrepareContext, Producer, Sink, StageFuture, Transform};
use crate::types::StageKind;

/// The component wrapped by a stage, tagged by capability.
#[derive(Clone)]
pub enum StageComponent {
    Producer(Arc<dyn Producer>),
    Transform(Arc<dyn Transform>),
    Sink(Arc<dyn Sink>),
}

impl StageComponent {
    pub fn kind(&self) -> StageKind {
        match self {
            StageComponent::Producer(_) => StageKind::Producer,
            StageComponent::Transform(_) => StageKind::Transform,
            StageComponent::Sink(_) => StageKind::Sink,
        }
    }

    pub fn prepare<'a>(&'a self, ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        match self {
            StageComponent::Producer(p) => p.prepare(ctx),
            StageComponent::Transform(t) => t.prepare(ctx),
            StageComponent::Sink(s) => s.prepare(ctx),
        }
    }

    pub fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        match self {
            StageComponent::Producer(p) => p.clean_up(),
            StageComponent::Transform(t) => t.clean_up(),
            StageComponent::Sink(s) => s.clean_up(),
        }
    }
}

impl fmt::Debug for StageComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageComponent::{:?}", self.kind())
    }
}

/// One stage of the graph.
///
/// Immutable once the graph is built.
#[derive(Debug, Clone)]
pub struct StageNode {
    pub(crate) name: String,
    pub(crate) component: StageComponent,
    pub(crate) parallelism: usize,
    pub(crate) upstreams: Vec<String>,
    pub(crate) downstreams: Vec<String>,
    pub(crate) queue_capacity: Option<usize>,
    pub(crate) settings: toml::Table,
}

impl StageNode {
    pub(crate) fn new(
        name: String,
        component: StageComponent,
        parallelism: usize,
        upstreams: Vec<String>,
    ) -> Self {
        Self {
            name,
            component,
            parallelism,
            upstreams,
            downstreams: Vec::new(),
            queue_capacity: None,
            settings: toml::Table::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.component.kind()
    }

    pub fn component(&self) -> &StageComponent {
        &self.component
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn upstreams(&self) -> &[String] {
        &self.upstreams
    }

    pub fn downstreams(&self) -> &[String] {
        &self.downstreams
    }

    /// Per-stage override of the input channel capacity, if any.
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue_capacity
    }

    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }

    pub fn prepare_context(&self) -> PrepareContext {
        PrepareContext {
            stage: self.name.clone(),
            kind: self.kind(),
            parallelism: self.parallelism,
            settings: self.settings.clone(),
        }
    }
}
