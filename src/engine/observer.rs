// src/engine/observer.rs

//! Event observers: external callbacks that watch a run and may stop it.
//!
//! Observers are invoked by the monitor, synchronously and in registration
//! order, with an immutable [`EngineSnapshot`] and an [`EngineControl`]
//! handle. Errors and panics from an observer are logged and otherwise
//! ignored.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::lifecycle::EngineState;
use crate::engine::runtime::EngineControl;
use crate::engine::status::{StageStatus, StatusMap};
use crate::graph::GraphSnapshot;
use crate::pool::worker::panic_message;

/// What an observer sees on each tick.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: EngineState,
    /// Monitor tick counter, starting at 1. The final update after drain
    /// carries the next number in sequence.
    pub tick: u64,
    /// Time since `start()` was called.
    pub elapsed: Duration,
    pub stages: StatusMap,
    pub graph: Arc<GraphSnapshot>,
}

impl EngineSnapshot {
    pub fn stage(&self, name: &str) -> Option<&StageStatus> {
        self.stages.get(name)
    }

    /// `succeeded` count of `name`, or 0 for an unknown stage.
    pub fn succeeded(&self, name: &str) -> u64 {
        self.stage(name).map_or(0, |s| s.succeeded)
    }

    pub fn failed(&self, name: &str) -> u64 {
        self.stage(name).map_or(0, |s| s.failed)
    }

    /// True for the update delivered after every worker has exited.
    pub fn is_final(&self) -> bool {
        self.state >= EngineState::Drained
    }
}

pub trait EventObserver: Send + Sync {
    fn on_update(&self, snapshot: &EngineSnapshot, control: &EngineControl) -> anyhow::Result<()>;
}

impl<F> EventObserver for F
where
    F: Fn(&EngineSnapshot, &EngineControl) + Send + Sync,
{
    fn on_update(&self, snapshot: &EngineSnapshot, control: &EngineControl) -> anyhow::Result<()> {
        self(snapshot, control);
        Ok(())
    }
}

/// Registered observers of one engine, in registration order.
#[derive(Default)]
pub struct ObserverSet {
    observers: Mutex<Vec<Arc<dyn EventObserver>>>,
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.len())
            .finish()
    }
}

impl ObserverSet {
    pub fn register(&self, observer: Arc<dyn EventObserver>) {
        self.lock().push(observer);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every observer once. Returns how many of them failed or panicked.
    pub fn notify(&self, snapshot: &EngineSnapshot, control: &EngineControl) -> usize {
        // Copy the list so an observer may register another without deadlocking.
        let observers: Vec<_> = self.lock().clone();
        let mut failures = 0;

        for (idx, observer) in observers.iter().enumerate() {
            let result =
                std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_update(snapshot, control)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(observer = idx, tick = snapshot.tick, error = %err, "observer failed");
                }
                Err(panic) => {
                    failures += 1;
                    warn!(
                        observer = idx,
                        tick = snapshot.tick,
                        panic = %panic_message(panic.as_ref()),
                        "observer panicked"
                    );
                }
            }
        }

        failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn EventObserver>>> {
        // A panicking observer never holds this lock, but stay usable regardless.
        self.observers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Logs one line per stage on every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusLogger;

impl EventObserver for StatusLogger {
    fn on_update(&self, snapshot: &EngineSnapshot, _control: &EngineControl) -> anyhow::Result<()> {
        for (name, status) in &snapshot.stages {
            info!(
                tick = snapshot.tick,
                state = %snapshot.state,
                stage = %name,
                kind = %status.kind,
                attempted = status.attempted,
                succeeded = status.succeeded,
                failed = status.failed,
                workers = status.active_workers,
                queued = status.queued,
                "stage status"
            );
        }
        Ok(())
    }
}

/// Stops the engine once `stage` has `succeeded` at least `target` times.
#[derive(Debug)]
pub struct StopAfter {
    stage: String,
    target: u64,
    fired: AtomicBool,
}

impl StopAfter {
    pub fn new(stage: impl Into<String>, target: u64) -> Self {
        Self {
            stage: stage.into(),
            target,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl EventObserver for StopAfter {
    fn on_update(&self, snapshot: &EngineSnapshot, control: &EngineControl) -> anyhow::Result<()> {
        if snapshot.stage(&self.stage).is_none() {
            anyhow::bail!("stop-after observer watches unknown stage '{}'", self.stage);
        }
        if snapshot.succeeded(&self.stage) < self.target || self.fired.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!(
            stage = %self.stage,
            target = self.target,
            "success target reached; stopping engine"
        );
        control.stop()?;
        Ok(())
    }
}
