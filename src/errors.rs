// src/errors.rs

//! Crate-wide error types.
//!
//! - [`GraphError`]: structural problems found while building a graph.
//! - [`EngineError`]: lifecycle failures reported by the engine.
//! - [`StageError`]: a single `produce` / `transform` / `consume` call failed.
//! - [`StreamgraphError`]: everything the config loader and CLI can hit.

use thiserror::Error;

/// Bad graph: rejected synchronously by the builder or at `start`.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("stage '{0}' is already registered")]
    DuplicateName(String),

    #[error("stage '{stage}' references unknown upstream '{upstream}'")]
    UnknownUpstream { stage: String, upstream: String },

    #[error("stage '{stage}' cannot read from sink '{upstream}'")]
    SinkAsUpstream { stage: String, upstream: String },

    #[error("producer '{0}' cannot declare upstreams")]
    UnexpectedUpstream(String),

    #[error("stage '{0}' must declare at least one upstream")]
    MissingUpstream(String),

    #[error("graph must contain at least one producer")]
    NoProducers,

    #[error("stage '{stage}' has invalid parallelism {parallelism} (must be >= 1)")]
    InvalidParallelism { stage: String, parallelism: usize },

    #[error("stage '{stage}' has invalid queue capacity {capacity} (must be >= 1)")]
    InvalidQueueCapacity { stage: String, capacity: usize },

    #[error("unknown stage '{0}'")]
    UnknownStage(String),
}

/// Lifecycle failures of a [`crate::engine::StreamEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("prepare failed for stage '{stage}': {source:#}")]
    PrepareFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("engine has already been started")]
    AlreadyStarted,

    #[error("engine has not been started")]
    NotStarted,

    #[error("engine is closed")]
    Closed,
}

/// Failure of one component call.
///
/// `Failed` is counted and the worker carries on. `Fatal` additionally makes a
/// producer worker exit as if its source were exhausted.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("fatal: {0:#}")]
    Fatal(anyhow::Error),
}

impl StageError {
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        StageError::Failed(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        StageError::Fatal(err.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Fatal(_))
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        StageError::Failed(err)
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::Failed(err.into())
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::Failed(err.into())
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;

#[derive(Error, Debug)]
pub enum StreamgraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in pipeline: {0}")]
    DagCycle(String),

    #[error("Unknown component '{component}' for stage '{stage}'")]
    UnknownComponent { stage: String, component: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StreamgraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_errors_become_recoverable_failures() {
        let err: StageError = anyhow::anyhow!("boom").into();
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn fatal_errors_are_flagged() {
        let err = StageError::fatal(anyhow::anyhow!("source gone"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("source gone"));
    }

    #[test]
    fn prepare_failure_names_the_stage() {
        let err = EngineError::PrepareFailed {
            stage: "w1".to_string(),
            source: anyhow::anyhow!("no credentials"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'w1'"));
        assert!(msg.contains("no credentials"));
    }

    #[test]
    fn graph_errors_pass_through_unchanged() {
        let err: StreamgraphError = GraphError::NoProducers.into();
        assert!(matches!(err, StreamgraphError::Graph(GraphError::NoProducers)));
        assert_eq!(err.to_string(), "graph must contain at least one producer");
    }
}
