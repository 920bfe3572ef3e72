// src/engine/runtime.rs

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::component::StageFuture;
use crate::config::EngineConfig;
use crate::engine::lifecycle::{self, EngineState, Lifecycle, StopAction};
use crate::engine::monitor::Monitor;
use crate::engine::observer::{EventObserver, ObserverSet};
use crate::engine::status::{StageStatus, StatusMap, StatusTable};
use crate::errors::EngineError;
use crate::graph::{GraphSnapshot, StageNode, StreamGraph};
use crate::pool::worker::panic_message;
use crate::pool::{self, PoolOptions, ProducerExit, ProducerExitHook};
use crate::types::StopReason;

/// State shared between the engine handle, its supervisor task, the
/// producer-exit hook and observer controls.
#[derive(Debug)]
struct Shared {
    lifecycle: Lifecycle,
    cancel: CancellationToken,
    reason: OnceLock<StopReason>,
    started: OnceLock<Instant>,
    finished: OnceLock<Instant>,
}

impl Shared {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            cancel: CancellationToken::new(),
            reason: OnceLock::new(),
            started: OnceLock::new(),
            finished: OnceLock::new(),
        }
    }

    /// First recorded reason wins.
    fn record(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
    }

    fn request_stop(&self, reason: StopReason) -> Result<(), EngineError> {
        loop {
            match lifecycle::on_stop(self.lifecycle.state()) {
                StopAction::Close => {
                    self.record(reason);
                    self.cancel.cancel();
                    if self
                        .lifecycle
                        .advance(&[EngineState::Built], EngineState::Cleaned)
                        .is_ok()
                    {
                        info!(%reason, "engine closed before start");
                        return Ok(());
                    }
                    // Lost a race with start(); decide again on the new state.
                }
                StopAction::Defer => {
                    self.record(reason);
                    self.cancel.cancel();
                    debug!(%reason, "stop requested during start");
                    return Ok(());
                }
                StopAction::BeginStopping => {
                    self.record(reason);
                    self.cancel.cancel();
                    if self
                        .lifecycle
                        .advance(&[EngineState::Running], EngineState::Stopping)
                        .is_ok()
                    {
                        info!(%reason, "engine stopping");
                    }
                    return Ok(());
                }
                StopAction::Ignore => return Ok(()),
                StopAction::Reject => return Err(EngineError::Closed),
            }
        }
    }

    fn elapsed(&self) -> Duration {
        match (self.started.get(), self.finished.get()) {
            (Some(start), Some(end)) => end.saturating_duration_since(*start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

/// Handle given to observers. Can stop the engine and read its state, nothing
/// else.
#[derive(Clone)]
pub struct EngineControl {
    shared: Arc<Shared>,
}

impl fmt::Debug for EngineControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineControl")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl EngineControl {
    /// Request a stop. Same semantics as [`StreamEngine::stop`].
    pub fn stop(&self) -> Result<(), EngineError> {
        self.shared.request_stop(StopReason::Requested)
    }

    pub fn state(&self) -> EngineState {
        self.shared.lifecycle.state()
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub reason: StopReason,
    pub status: StatusMap,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn stage(&self, name: &str) -> Option<&StageStatus> {
        self.status.get(name)
    }

    pub fn succeeded(&self, name: &str) -> u64 {
        self.stage(name).map_or(0, |s| s.succeeded)
    }

    pub fn total_failed(&self) -> u64 {
        self.status.values().map(|s| s.failed).sum()
    }
}

struct Inner {
    graph: StreamGraph,
    graph_snapshot: Arc<GraphSnapshot>,
    config: EngineConfig,
    status: Arc<StatusTable>,
    observers: Arc<ObserverSet>,
    shared: Arc<Shared>,
}

/// Runs one frozen [`StreamGraph`].
///
/// This is the IO shell around the pieces in `pool` and the lifecycle state
/// machine: it prepares components, spawns worker pools and the monitor, and
/// supervises the drain and clean-up. Cloning yields another handle to the
/// same engine. Separate engines share nothing.
#[derive(Clone)]
pub struct StreamEngine {
    inner: Arc<Inner>,
}

impl fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEngine")
            .field("stages", &self.inner.graph.len())
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl StreamEngine {
    pub fn new(graph: StreamGraph, config: EngineConfig) -> Self {
        let status = Arc::new(StatusTable::for_graph(&graph));
        let graph_snapshot = Arc::new(graph.snapshot());
        Self {
            inner: Arc::new(Inner {
                graph,
                graph_snapshot,
                config,
                status,
                observers: Arc::new(ObserverSet::default()),
                shared: Arc::new(Shared::new()),
            }),
        }
    }

    /// Add an observer. Observers registered after start are picked up on
    /// the next tick.
    pub fn register_observer<O>(&self, observer: O)
    where
        O: EventObserver + 'static,
    {
        self.inner.observers.register(Arc::new(observer));
    }

    pub fn register_shared_observer(&self, observer: Arc<dyn EventObserver>) {
        self.inner.observers.register(observer);
    }

    pub fn state(&self) -> EngineState {
        self.inner.shared.lifecycle.state()
    }

    pub fn status(&self) -> StatusMap {
        self.inner.status.snapshot()
    }

    pub fn graph_snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.inner.graph_snapshot)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn control(&self) -> EngineControl {
        EngineControl {
            shared: Arc::clone(&self.inner.shared),
        }
    }

    /// Prepare every component, then launch the worker pools and the monitor.
    ///
    /// Returns once the engine is `Running` (or already `Stopping` if a stop
    /// arrived during prepare). Must be called inside a Tokio runtime.
    pub async fn start(&self) -> Result<(), EngineError> {
        let shared = &self.inner.shared;
        if let Err(current) = shared
            .lifecycle
            .advance(&[EngineState::Built], EngineState::Starting)
        {
            return Err(match lifecycle::on_start(current) {
                Err(err) => err,
                Ok(()) => EngineError::AlreadyStarted,
            });
        }
        let _ = shared.started.set(Instant::now());

        info!(
            stages = self.inner.graph.len(),
            producers = self.inner.graph.producer_workers(),
            "starting engine"
        );

        self.prepare_all().await?;

        let _ = shared
            .lifecycle
            .advance(&[EngineState::Starting], EngineState::Running);

        let remaining = Arc::new(AtomicUsize::new(self.inner.graph.producer_workers()));
        let hook: ProducerExitHook = {
            let shared = Arc::clone(shared);
            Arc::new(move |stage: &str, exit: ProducerExit| {
                let left = remaining.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
                debug!(stage, ?exit, producers_left = left, "producer worker exited");
                if left == 0 {
                    let _ = shared.request_stop(StopReason::Exhausted);
                }
            })
        };
        let options = PoolOptions {
            cancel: shared.cancel.clone(),
            idle_backoff: self.inner.config.idle_backoff(),
            on_producer_exit: hook,
        };

        let wiring = pool::wire(&self.inner.graph, self.inner.config.queue_capacity.max(1));
        let mut workers = JoinSet::new();
        pool::spawn_pools(wiring, &self.inner.status, &options, &mut workers);

        let monitor_done = CancellationToken::new();
        let monitor = Monitor {
            interval: self.inner.config.monitor_interval(),
            status: Arc::clone(&self.inner.status),
            graph: Arc::clone(&self.inner.graph_snapshot),
            observers: Arc::clone(&self.inner.observers),
            control: self.control(),
            started: shared.started.get().copied().unwrap_or_else(Instant::now),
        };
        let monitor = tokio::spawn(monitor.run(monitor_done.clone()));

        if shared.cancel.is_cancelled() {
            let _ = shared.request_stop(StopReason::Requested);
        }

        info!("engine running");
        tokio::spawn(supervise(Arc::clone(&self.inner), workers, monitor, monitor_done));
        Ok(())
    }

    /// Ask the engine to stop. Producers stop pulling; everything already in
    /// a channel is drained before clean-up.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.inner.shared.request_stop(StopReason::Requested)
    }

    /// Wait until the engine is `Cleaned` and return the run summary.
    pub async fn wait(&self) -> Result<RunReport, EngineError> {
        if self.state() == EngineState::Built {
            return Err(EngineError::NotStarted);
        }
        self.inner.shared.lifecycle.wait_for(EngineState::Cleaned).await;
        Ok(self.report())
    }

    /// `start` followed by `wait`.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        self.start().await?;
        self.wait().await
    }

    fn report(&self) -> RunReport {
        let shared = &self.inner.shared;
        RunReport {
            reason: shared.reason.get().copied().unwrap_or(StopReason::Exhausted),
            status: self.inner.status.snapshot(),
            elapsed: shared.elapsed(),
        }
    }

    async fn prepare_all(&self) -> Result<(), EngineError> {
        let shared = &self.inner.shared;
        let mut prepared: Vec<&StageNode> = Vec::with_capacity(self.inner.graph.len());

        for node in self.inner.graph.nodes() {
            let ctx = node.prepare_context();
            debug!(stage = %node.name(), kind = %node.kind(), "preparing stage");

            if let Err(source) = call_guarded(node.component().prepare(&ctx)).await {
                error!(stage = %node.name(), error = %source, "prepare failed");
                for done in prepared.iter().rev() {
                    clean_up_node(done).await;
                }
                shared.record(StopReason::PrepareFailed);
                shared.cancel.cancel();
                let _ = shared.finished.set(Instant::now());
                let _ = shared
                    .lifecycle
                    .advance(&[EngineState::Starting], EngineState::Cleaned);
                return Err(EngineError::PrepareFailed {
                    stage: node.name().to_string(),
                    source,
                });
            }
            prepared.push(node);
        }
        Ok(())
    }
}

/// Wait for the pools to drain, finish the monitor, clean up, close.
async fn supervise(
    inner: Arc<Inner>,
    mut workers: JoinSet<()>,
    monitor: tokio::task::JoinHandle<u64>,
    monitor_done: CancellationToken,
) {
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "worker task ended abnormally");
        }
    }

    let shared = &inner.shared;
    let _ = shared.lifecycle.advance(
        &[EngineState::Running, EngineState::Stopping],
        EngineState::Drained,
    );
    info!("all workers drained");

    monitor_done.cancel();
    if let Err(err) = monitor.await {
        warn!(error = %err, "monitor task ended abnormally");
    }

    for node in inner.graph.nodes() {
        clean_up_node(node).await;
    }

    let _ = shared.finished.set(Instant::now());
    let _ = shared
        .lifecycle
        .advance(&[EngineState::Drained], EngineState::Cleaned);
    info!(elapsed_ms = shared.elapsed().as_millis() as u64, "engine cleaned up");
}

async fn clean_up_node(node: &StageNode) {
    debug!(stage = %node.name(), "cleaning up stage");
    if let Err(err) = call_guarded(node.component().clean_up()).await {
        warn!(stage = %node.name(), error = %err, "clean-up failed");
    }
}

/// Await a prepare/clean-up call, converting a panic into an error.
async fn call_guarded(call: StageFuture<'_, anyhow::Result<()>>) -> anyhow::Result<()> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "component panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}
