// src/lib.rs

pub mod cli;
pub mod component;
pub mod components;
pub mod config;
pub mod datum;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod pool;
pub mod types;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::components::{ComponentRegistry, build_graph};
use crate::config::{PipelineFile, load_and_validate};
use crate::engine::{RunReport, StatusLogger, StopAfter, StreamEngine};
use crate::graph::StreamGraph;
use crate::types::StageKind;

pub use crate::component::{PrepareContext, Produced, Producer, Sink, StageFuture, Transform};
pub use crate::datum::{Datum, Document};
pub use crate::errors::{EngineError, GraphError, StageError, StageResult};
pub use crate::graph::GraphBuilder;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and validation
/// - component lookup and graph building
/// - the engine with its observers
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let pipeline = load_and_validate(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let registry = ComponentRegistry::with_builtins();
    let graph = build_graph(&pipeline, &registry)?;

    if args.dry_run {
        print_dry_run(&pipeline, &graph);
        return Ok(());
    }

    let engine = StreamEngine::new(graph.clone(), pipeline.engine.clone());
    engine.register_observer(StatusLogger);

    if let Some(target) = args.stop_after {
        let stage = match args.stop_stage.clone() {
            Some(stage) => stage,
            None => first_sink(&graph).context("--stop-after needs a sink stage to watch")?,
        };
        if graph.node(&stage).is_none() {
            anyhow::bail!("--stop-stage names unknown stage '{stage}'");
        }
        info!(stage = %stage, target, "will stop after success target");
        engine.register_observer(StopAfter::new(stage, target));
    }

    // Ctrl-C → graceful stop.
    {
        let control = engine.control();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping");
            let _ = control.stop();
        });
    }

    let report = engine.run().await?;
    print_summary(&report);
    Ok(())
}

fn first_sink(graph: &StreamGraph) -> Option<String> {
    graph
        .nodes()
        .iter()
        .find(|n| n.kind() == StageKind::Sink)
        .map(|n| n.name().to_string())
}

/// Print engine settings and stages in the order they will be built.
fn print_dry_run(pipeline: &PipelineFile, graph: &StreamGraph) {
    println!("streamgraph dry-run");
    println!("  engine.queue_capacity = {}", pipeline.engine.queue_capacity);
    println!(
        "  engine.monitor_interval_ms = {}",
        pipeline.engine.monitor_interval_ms
    );
    println!("  engine.idle_backoff_ms = {}", pipeline.engine.idle_backoff_ms);
    println!();

    println!("stages ({}):", graph.len());
    for (name, stage) in pipeline.stages_in_order() {
        println!("  - {name}");
        println!("      component: {}", stage.component);
        if let Some(node) = graph.node(name) {
            println!("      kind: {}", node.kind());
            if !node.downstreams().is_empty() {
                println!("      feeds: {:?}", node.downstreams());
            }
        }
        println!("      parallelism: {}", stage.parallelism);
        if !stage.after.is_empty() {
            println!("      after: {:?}", stage.after);
        }
        if let Some(capacity) = stage.queue_capacity {
            println!("      queue_capacity: {capacity}");
        }
        if !stage.settings.is_empty() {
            println!("      settings: {}", stage.settings);
        }
    }

    debug!("dry-run complete (nothing started)");
}

/// Final status table, on stderr so sink output on stdout stays clean.
fn print_summary(report: &RunReport) {
    eprintln!(
        "run finished ({}) in {:.2?}",
        report.reason, report.elapsed
    );
    eprintln!(
        "  {:<20} {:<10} {:>10} {:>10} {:>10}",
        "stage", "kind", "attempted", "succeeded", "failed"
    );
    for (name, status) in &report.status {
        eprintln!(
            "  {:<20} {:<10} {:>10} {:>10} {:>10}",
            name,
            status.kind.as_str(),
            status.attempted,
            status.succeeded,
            status.failed
        );
    }
}
