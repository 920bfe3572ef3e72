// src/pool/worker.rs

//! Worker loops for the three stage kinds.
//!
//! Every component call goes through [`guarded`], which turns a panic inside
//! the component into an ordinary processing failure. A failed call is
//! counted and logged; the worker keeps going.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::component::{Produced, Producer, Sink, StageFuture, Transform};
use crate::engine::status::StageCounters;
use crate::errors::{StageError, StageResult};
use crate::pool::channel::{OutputPorts, StageInput};

/// Identity and shared state of one worker.
#[derive(Debug)]
pub struct WorkerContext {
    pub stage: String,
    pub worker: usize,
    pub counters: Arc<StageCounters>,
    pub outputs: OutputPorts,
}

/// Why a producer worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// The component reported `Produced::Exhausted`.
    Exhausted,
    /// The component returned a fatal error.
    Fatal,
    /// The engine was asked to stop.
    Cancelled,
}

/// Await a component call, converting a panic into a `StageError`.
pub async fn guarded<T>(call: StageFuture<'_, StageResult<T>>) -> StageResult<T> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(StageError::Failed(anyhow::anyhow!(
            "component panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Sleep for `period` unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

/// Poll the producer until it is exhausted, fails fatally, or the engine stops.
///
/// The stop flag is checked between calls only. A `produce` call that has
/// started always runs to completion and its unit is broadcast before the
/// worker looks at the flag again.
pub async fn run_producer(
    ctx: WorkerContext,
    producer: Arc<dyn Producer>,
    cancel: CancellationToken,
    idle_backoff: Duration,
) -> ProducerExit {
    debug!(stage = %ctx.stage, worker = ctx.worker, "producer worker started");

    let exit = loop {
        if cancel.is_cancelled() {
            break ProducerExit::Cancelled;
        }

        let produced = guarded(producer.produce()).await;

        match produced {
            Ok(Produced::Datum(datum)) => {
                ctx.counters.record_attempt();
                ctx.counters.record_success();
                trace!(stage = %ctx.stage, worker = ctx.worker, id = ?datum.id(), "produced unit");
                if !ctx.outputs.is_empty() && ctx.outputs.broadcast(datum).await == 0 {
                    warn!(
                        stage = %ctx.stage,
                        worker = ctx.worker,
                        "no downstream accepted the unit"
                    );
                }
            }
            Ok(Produced::Idle) => {
                if !pause(&cancel, idle_backoff).await {
                    break ProducerExit::Cancelled;
                }
            }
            Ok(Produced::Exhausted) => break ProducerExit::Exhausted,
            Err(err) if err.is_fatal() => {
                ctx.counters.record_attempt();
                ctx.counters.record_failure();
                error!(
                    stage = %ctx.stage,
                    worker = ctx.worker,
                    error = %err,
                    "producer failed fatally; worker exiting"
                );
                break ProducerExit::Fatal;
            }
            Err(err) => {
                ctx.counters.record_attempt();
                ctx.counters.record_failure();
                warn!(
                    stage = %ctx.stage,
                    worker = ctx.worker,
                    error = %err,
                    "produce failed"
                );
                if !pause(&cancel, idle_backoff).await {
                    break ProducerExit::Cancelled;
                }
            }
        }
    };

    debug!(stage = %ctx.stage, worker = ctx.worker, ?exit, "producer worker finished");
    exit
}

/// Transform units until the input channel is closed and drained.
pub async fn run_transform(ctx: WorkerContext, transform: Arc<dyn Transform>, input: Arc<StageInput>) {
    debug!(stage = %ctx.stage, worker = ctx.worker, "transform worker started");

    while let Some(datum) = input.recv().await {
        ctx.counters.record_attempt();
        match guarded(transform.transform(datum)).await {
            Ok(outputs) => {
                trace!(
                    stage = %ctx.stage,
                    worker = ctx.worker,
                    outputs = outputs.len(),
                    "transformed unit"
                );
                for out in outputs {
                    ctx.outputs.broadcast(out).await;
                }
                ctx.counters.record_success();
            }
            Err(err) => {
                ctx.counters.record_failure();
                warn!(
                    stage = %ctx.stage,
                    worker = ctx.worker,
                    error = %err,
                    "transform failed; unit dropped"
                );
            }
        }
    }

    debug!(stage = %ctx.stage, worker = ctx.worker, "transform worker drained");
}

/// Consume units until the input channel is closed and drained.
pub async fn run_sink(ctx: WorkerContext, sink: Arc<dyn Sink>, input: Arc<StageInput>) {
    debug!(stage = %ctx.stage, worker = ctx.worker, "sink worker started");

    while let Some(datum) = input.recv().await {
        ctx.counters.record_attempt();
        match guarded(sink.consume(datum)).await {
            Ok(()) => ctx.counters.record_success(),
            Err(err) => {
                ctx.counters.record_failure();
                warn!(
                    stage = %ctx.stage,
                    worker = ctx.worker,
                    error = %err,
                    "consume failed"
                );
            }
        }
    }

    debug!(stage = %ctx.stage, worker = ctx.worker, "sink worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;
    use crate::pool::channel::bounded;
    use crate::types::StageKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Countdown(AtomicUsize);

    impl Producer for Countdown {
        fn produce(&self) -> StageFuture<'_, StageResult<Produced>> {
            Box::pin(async move {
                let left = self.0.load(Ordering::SeqCst);
                if left == 0 {
                    return Ok(Produced::Exhausted);
                }
                self.0.store(left - 1, Ordering::SeqCst);
                match left {
                    3 => Err(StageError::failed(anyhow::anyhow!("flaky"))),
                    2 => Ok(Produced::Idle),
                    _ => Ok(Produced::Datum(Datum::new(json!(left)))),
                }
            })
        }
    }

    struct Explodes;

    impl Sink for Explodes {
        fn consume(&self, datum: Datum) -> StageFuture<'_, StageResult<()>> {
            Box::pin(async move {
                if datum.document() == &json!("bad") {
                    panic!("cannot handle bad input");
                }
                Ok(())
            })
        }
    }

    fn context(stage: &str, kind: StageKind, outputs: OutputPorts) -> (WorkerContext, Arc<StageCounters>) {
        let counters = Arc::new(StageCounters::new(kind));
        (
            WorkerContext {
                stage: stage.to_string(),
                worker: 0,
                counters: Arc::clone(&counters),
                outputs,
            },
            counters,
        )
    }

    #[tokio::test]
    async fn producer_counts_data_and_errors_but_not_idle_polls() {
        let (tx, input) = bounded("sink", 8);
        let (ctx, counters) = context("p", StageKind::Producer, OutputPorts::new(vec![tx]));

        let exit = run_producer(
            ctx,
            Arc::new(Countdown(AtomicUsize::new(5))),
            CancellationToken::new(),
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(exit, ProducerExit::Exhausted);
        let snap = counters.snapshot();
        assert_eq!((snap.attempted, snap.succeeded, snap.failed), (4, 3, 1));

        let mut received = Vec::new();
        while let Some(d) = input.recv().await {
            received.push(d.document().clone());
        }
        assert_eq!(received, vec![json!(5), json!(4), json!(1)]);
    }

    #[tokio::test]
    async fn cancelled_producer_exits_without_polling() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (ctx, counters) = context("p", StageKind::Producer, OutputPorts::default());

        let exit = run_producer(
            ctx,
            Arc::new(Countdown(AtomicUsize::new(5))),
            cancel,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(exit, ProducerExit::Cancelled);
        assert_eq!(counters.snapshot().attempted, 0);
    }

    #[tokio::test]
    async fn sink_panics_are_counted_as_failures() {
        let (tx, input) = bounded("s", 4);
        tx.send(Datum::new(json!("ok"))).await.unwrap();
        tx.send(Datum::new(json!("bad"))).await.unwrap();
        tx.send(Datum::new(json!("ok"))).await.unwrap();
        drop(tx);

        let (ctx, counters) = context("s", StageKind::Sink, OutputPorts::default());
        run_sink(ctx, Arc::new(Explodes), Arc::new(input)).await;

        let snap = counters.snapshot();
        assert_eq!((snap.attempted, snap.succeeded, snap.failed), (3, 2, 1));
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
