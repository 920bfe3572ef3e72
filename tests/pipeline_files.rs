// tests/pipeline_files.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::fs;
use std::io::Write;

use tempfile::TempDir;

use streamgraph::components::{ComponentRegistry, build_graph};
use streamgraph::config::{EngineConfig, load_and_validate};
use streamgraph::engine::{StopReason, StreamEngine};
use streamgraph::errors::StreamgraphError;
use streamgraph::graph::StageComponent;
use streamgraph::types::StageKind;
use streamgraph_test_utils::RecordingSink;
use streamgraph_test_utils::builders::PipelineTomlBuilder;

fn write_pipeline(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Streamgraph.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn loads_engine_section_and_stage_order() {
    let dir = TempDir::new().unwrap();
    let toml = PipelineTomlBuilder::new()
        .queue_capacity(8)
        .monitor_interval_ms(50)
        .stage("out", "count", &["decode"])
        .stage("decode", "json", &["src"])
        .parallelism("decode", 4)
        .stage("src", "numeric", &[])
        .setting("src", "count", "5")
        .build();
    let path = write_pipeline(&dir, &toml);

    let pipeline = load_and_validate(&path).unwrap();

    assert_eq!(pipeline.engine.queue_capacity, 8);
    assert_eq!(pipeline.engine.monitor_interval_ms, 50);
    assert_eq!(pipeline.engine.idle_backoff_ms, EngineConfig::default().idle_backoff_ms);
    assert_eq!(pipeline.topological_order(), ["src", "decode", "out"]);
    assert_eq!(pipeline.stage["decode"].parallelism, 4);
}

#[test]
fn cycle_in_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let toml = PipelineTomlBuilder::new()
        .stage("src", "numeric", &[])
        .stage("a", "passthrough", &["src", "b"])
        .stage("b", "passthrough", &["a"])
        .build();
    let path = write_pipeline(&dir, &toml);

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, StreamgraphError::DagCycle(_)), "got {err:?}");
}

#[test]
fn unknown_dependency_is_rejected() {
    let dir = TempDir::new().unwrap();
    let toml = PipelineTomlBuilder::new()
        .stage("src", "numeric", &[])
        .stage("out", "count", &["nope"])
        .build();
    let path = write_pipeline(&dir, &toml);

    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("unknown dependency 'nope'"), "got {err}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, StreamgraphError::IoError(_)));
}

#[test]
fn malformed_toml_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_pipeline(&dir, "[stage.src\ncomponent = ");
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, StreamgraphError::TomlError(_)));
}

#[tokio::test]
async fn lines_file_runs_through_json_decode() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("events.jsonl");
    {
        let mut f = fs::File::create(&input).unwrap();
        writeln!(f, r#"{{"user": "ada", "n": 1}}"#).unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(f, r#"{{"user": "grace", "n": 2}}"#).unwrap();
    }

    let toml = PipelineTomlBuilder::new()
        .monitor_interval_ms(10)
        .stage("src", "lines", &[])
        .setting("src", "path", &format!("{:?}", input.display().to_string()))
        .stage("decode", "json", &["src"])
        .stage("out", "recording", &["decode"])
        .build();
    let path = write_pipeline(&dir, &toml);
    let pipeline = load_and_validate(&path).unwrap();

    // Custom components plug into the same registry as the built-ins.
    let sink = std::sync::Arc::new(RecordingSink::new());
    let mut registry = ComponentRegistry::with_builtins();
    {
        let sink = sink.clone();
        registry.register("recording", move || StageComponent::Sink(sink.clone()));
    }

    let graph = build_graph(&pipeline, &registry).unwrap();
    assert_eq!(graph.node("out").unwrap().kind(), StageKind::Sink);

    let engine = StreamEngine::new(graph, pipeline.engine.clone());
    let report = with_timeout(engine.run()).await.unwrap();

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(report.succeeded("src"), 3);
    let decode = report.stage("decode").unwrap();
    assert_eq!((decode.succeeded, decode.failed), (2, 1));

    let users: Vec<String> = sink
        .received()
        .iter()
        .map(|d| d.document()["user"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(users, vec!["ada", "grace"]);
    assert_eq!(sink.received()[1].id(), Some("3"));
}

#[tokio::test]
async fn numeric_pipeline_from_file_counts_to_setting() {
    init_tracing();

    let dir = TempDir::new().unwrap();
    let toml = PipelineTomlBuilder::new()
        .queue_capacity(2)
        .monitor_interval_ms(10)
        .stage("src", "numeric", &[])
        .parallelism("src", 3)
        .setting("src", "count", "40")
        .stage("fwd", "passthrough", &["src"])
        .parallelism("fwd", 2)
        .stage("out", "count", &["fwd"])
        .build();
    let path = write_pipeline(&dir, &toml);

    let pipeline = load_and_validate(&path).unwrap();
    let graph = build_graph(&pipeline, &ComponentRegistry::with_builtins()).unwrap();
    let report = with_timeout(StreamEngine::new(graph, pipeline.engine.clone()).run())
        .await
        .unwrap();

    assert_eq!(report.succeeded("src"), 40);
    assert_eq!(report.succeeded("out"), 40);
}
