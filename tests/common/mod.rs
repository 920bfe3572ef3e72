#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use streamgraph::config::EngineConfig;
use streamgraph::engine::{RunReport, StreamEngine};
use streamgraph::graph::StreamGraph;

pub use streamgraph_test_utils::{init_tracing, with_timeout, with_timeout_secs};

/// Small queues and a fast monitor so tests exercise backpressure and
/// observers without waiting long.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_queue_capacity(4)
        .with_monitor_interval(Duration::from_millis(20))
        .with_idle_backoff(Duration::from_millis(1))
}

/// Build an engine with [`fast_config`], run it to completion, return the report.
pub async fn run_graph(graph: StreamGraph) -> RunReport {
    let engine = StreamEngine::new(graph, fast_config());
    engine.run().await.expect("run should succeed")
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
