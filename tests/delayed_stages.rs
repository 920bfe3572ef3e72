// tests/delayed_stages.rs

mod common;
use crate::common::{fast_config, init_tracing, run_graph, shared, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use streamgraph::engine::{EngineSnapshot, EngineState, StopAfter, StopReason, StreamEngine};
use streamgraph::graph::StreamGraph;
use streamgraph::types::StageKind;
use streamgraph_test_utils::{ClaimingProducer, CountingProducer, CountingTransform, RecordingSink};

#[tokio::test]
async fn delayed_sink_receives_everything() {
    init_tracing();

    let producer = shared(CountingProducer::new(10));
    let sink = shared(RecordingSink::with_delay(Duration::from_millis(20)));

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 1).unwrap();
    builder.add_sink("w1", sink.clone(), 1, &["p1"]).unwrap();

    let report = with_timeout(run_graph(builder.build().unwrap())).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(sink.count(), 10);
    assert_eq!(report.succeeded("w1"), 10);
    assert_eq!(report.succeeded("p1"), 10);
    assert_eq!(sink.sorted_values(), (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn delayed_transform_with_parallel_workers() {
    init_tracing();

    let producer = shared(CountingProducer::new(12));
    let transform = shared(CountingTransform::with_delay(Duration::from_millis(25)));
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 1).unwrap();
    builder.add_transform("t1", transform.clone(), 3, &["p1"]).unwrap();
    builder.add_sink("w1", sink.clone(), 1, &["t1"]).unwrap();

    let report = with_timeout(run_graph(builder.build().unwrap())).await;

    assert_eq!(transform.seen(), 12);
    assert_eq!(report.succeeded("t1"), 12);
    assert_eq!(sink.sorted_values(), (0..12).collect::<Vec<_>>());
}

#[tokio::test]
async fn delayed_producer_is_drained_completely() {
    init_tracing();

    let producer = shared(CountingProducer::with_delay(5, Duration::from_millis(30)));
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 1).unwrap();
    builder.add_sink("w1", sink.clone(), 1, &["p1"]).unwrap();

    let report = with_timeout(run_graph(builder.build().unwrap())).await;

    assert_eq!(producer.emitted(), 5);
    assert_eq!(sink.count(), 5);
    assert!(report.elapsed >= Duration::from_millis(150));
}

#[tokio::test]
async fn observer_stop_lets_the_running_produce_call_finish() {
    init_tracing();

    // Units arrive every 300ms; the observer stops the run once w1 has two,
    // while the third call is still sleeping.
    let producer = shared(CountingProducer::with_delay(100, Duration::from_millis(300)));
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 1).unwrap();
    builder.add_sink("w1", sink.clone(), 1, &["p1"]).unwrap();

    let engine = StreamEngine::new(builder.build().unwrap(), fast_config());
    let stopper = Arc::new(StopAfter::new("w1", 2));
    engine.register_shared_observer(stopper.clone());

    let report = with_timeout(engine.run()).await.unwrap();

    assert!(stopper.has_fired());
    assert_eq!(report.reason, StopReason::Requested);
    assert_eq!(sink.count(), 3);
    assert_eq!(sink.count() as u64, producer.emitted());
    assert_eq!(engine.state(), EngineState::Cleaned);
}

#[tokio::test]
async fn records_claimed_before_an_await_survive_stop() {
    init_tracing();

    let producer = shared(ClaimingProducer::new(100, Duration::from_millis(300)));
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 1).unwrap();
    builder.add_sink("w1", sink.clone(), 1, &["p1"]).unwrap();

    let engine = StreamEngine::new(builder.build().unwrap(), fast_config());
    engine.register_observer(|snap: &EngineSnapshot, control: &streamgraph::engine::EngineControl| {
        if snap.succeeded("w1") >= 1 {
            let _ = control.stop();
        }
    });

    let report = with_timeout(engine.run()).await.unwrap();

    assert_eq!(report.reason, StopReason::Requested);
    assert_eq!(engine.state(), EngineState::Cleaned);
    assert_eq!(producer.unfinished(), 0);
    assert!(producer.claimed() >= 2, "claimed {}", producer.claimed());
    assert_eq!(sink.count() as u64, producer.claimed());
    assert_eq!(sink.sorted_values(), (0..producer.claimed()).collect::<Vec<_>>());
}

#[tokio::test]
async fn closure_observer_can_stop_the_engine() {
    init_tracing();

    let producer = shared(CountingProducer::with_delay(1_000, Duration::from_millis(5)));
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 1).unwrap();
    builder.add_sink("w1", sink.clone(), 1, &["p1"]).unwrap();

    let engine = StreamEngine::new(builder.build().unwrap(), fast_config());
    engine.register_observer(|snap: &EngineSnapshot, control: &streamgraph::engine::EngineControl| {
        if snap.succeeded("w1") >= 5 {
            control.stop().unwrap();
        }
    });

    let report = with_timeout(engine.run()).await.unwrap();

    assert_eq!(report.reason, StopReason::Requested);
    assert!(sink.count() >= 5);
    assert!(sink.count() < 1_000);
    assert_eq!(sink.count() as u64, producer.emitted());
}

#[tokio::test]
async fn producer_without_data_ends_the_run() {
    init_tracing();

    let producer = shared(CountingProducer::new(0));
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 2).unwrap();
    builder.add_sink("w1", sink.clone(), 2, &["p1"]).unwrap();

    let report = with_timeout(run_graph(builder.build().unwrap())).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(sink.count(), 0);
    let w1 = report.stage("w1").unwrap();
    assert_eq!((w1.attempted, w1.succeeded, w1.failed), (0, 0, 0));
    assert_eq!(w1.active_workers, 0);
}

#[tokio::test]
async fn status_reports_stage_kinds() {
    init_tracing();

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", shared(CountingProducer::new(3)), 1).unwrap();
    builder.add_transform("t1", shared(CountingTransform::default()), 1, &["p1"]).unwrap();
    builder.add_sink("w1", shared(RecordingSink::new()), 1, &["t1"]).unwrap();

    let engine = StreamEngine::new(builder.build().unwrap(), fast_config());
    let before = engine.status();
    assert_eq!(before["p1"].kind, StageKind::Producer);
    assert_eq!(before["t1"].kind, StageKind::Transform);
    assert_eq!(before["w1"].kind, StageKind::Sink);
    assert_eq!(before["w1"].succeeded, 0);

    let report = with_timeout(engine.run()).await.unwrap();
    assert_eq!(report.status["t1"].kind, StageKind::Transform);
    assert_eq!(report.succeeded("w1"), 3);
}

#[tokio::test]
async fn prepare_and_clean_up_are_called_once_per_component() {
    init_tracing();

    let producer = shared(CountingProducer::new(4));
    let transform = shared(CountingTransform::default());
    let sink = shared(RecordingSink::new());

    let mut builder = StreamGraph::builder();
    builder.add_producer("p1", producer.clone(), 2).unwrap();
    builder.add_transform("t1", transform.clone(), 2, &["p1"]).unwrap();
    builder.add_sink("w1", sink.clone(), 2, &["t1"]).unwrap();

    with_timeout(run_graph(builder.build().unwrap())).await;

    for (prepared, cleaned) in [
        (producer.lifecycle.prepared(), producer.lifecycle.cleaned()),
        (transform.lifecycle.prepared(), transform.lifecycle.cleaned()),
        (sink.lifecycle.prepared(), sink.lifecycle.cleaned()),
    ] {
        assert_eq!(prepared, 1);
        assert_eq!(cleaned, 1);
    }
}
