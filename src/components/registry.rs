// src/components/registry.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::components::{CountSink, JsonDecode, LinesProducer, NumericProducer, Passthrough, StdoutSink};
use crate::config::PipelineFile;
use crate::errors::{Result, StreamgraphError};
use crate::graph::{GraphBuilder, StageComponent, StreamGraph};
use crate::types::StageKind;

type Factory = Arc<dyn Fn() -> StageComponent + Send + Sync>;

/// Maps component names used in pipeline files to constructors.
///
/// Every stage gets a fresh component instance.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register("numeric", || StageComponent::Producer(Arc::new(NumericProducer::unbounded())))
            .register("lines", || StageComponent::Producer(Arc::new(LinesProducer::default())))
            .register("passthrough", || StageComponent::Transform(Arc::new(Passthrough::default())))
            .register("json", || StageComponent::Transform(Arc::new(JsonDecode)))
            .register("stdout", || StageComponent::Sink(Arc::new(StdoutSink)))
            .register("count", || StageComponent::Sink(Arc::new(CountSink::default())));
        registry
    }

    /// Add or replace a component constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> StageComponent + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn instantiate(&self, stage: &str, component: &str) -> Result<StageComponent> {
        let factory = self
            .factories
            .get(component)
            .ok_or_else(|| StreamgraphError::UnknownComponent {
                stage: stage.to_string(),
                component: component.to_string(),
            })?;
        Ok(factory())
    }

    /// Kind of a registered component, without keeping the instance.
    pub fn kind_of(&self, component: &str) -> Option<StageKind> {
        self.factories.get(component).map(|factory| factory().kind())
    }
}

/// Turn a validated pipeline file into a frozen graph.
pub fn build_graph(pipeline: &PipelineFile, registry: &ComponentRegistry) -> Result<StreamGraph> {
    let mut builder = GraphBuilder::new();

    for (name, stage) in pipeline.stages_in_order() {
        let component = registry.instantiate(name, &stage.component)?;
        debug!(stage = name, component = %stage.component, kind = %component.kind(), "adding stage");

        builder.add_stage(name, component, stage.parallelism, stage.after.as_slice())?;
        if !stage.settings.is_empty() {
            builder.configure(name, stage.settings.clone())?;
        }
        if let Some(capacity) = stage.queue_capacity {
            builder.set_queue_capacity(name, capacity)?;
        }
    }

    Ok(builder.build()?)
}
