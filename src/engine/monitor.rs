// src/engine/monitor.rs

//! The monitoring loop.
//!
//! Runs as one task beside the worker pools. On every tick it copies the
//! status table and hands the copy to the observers. When `done` fires it
//! delivers one last update and returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::engine::observer::{EngineSnapshot, ObserverSet};
use crate::engine::runtime::EngineControl;
use crate::engine::status::StatusTable;
use crate::graph::GraphSnapshot;

#[derive(Debug)]
pub struct Monitor {
    pub interval: Duration,
    pub status: Arc<StatusTable>,
    pub graph: Arc<GraphSnapshot>,
    pub observers: Arc<ObserverSet>,
    pub control: EngineControl,
    pub started: Instant,
}

impl Monitor {
    fn snapshot(&self, tick: u64) -> EngineSnapshot {
        EngineSnapshot {
            state: self.control.state(),
            tick,
            elapsed: self.started.elapsed(),
            stages: self.status.snapshot(),
            graph: Arc::clone(&self.graph),
        }
    }

    fn notify(&self, tick: u64) {
        let snapshot = self.snapshot(tick);
        trace!(tick, state = %snapshot.state, "monitor tick");
        self.observers.notify(&snapshot, &self.control);
    }

    /// Tick until `done` is cancelled. Returns the number of updates delivered,
    /// including the final one.
    pub async fn run(self, done: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        let mut tick = 0;
        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    tick += 1;
                    self.notify(tick);
                }
            }
        }

        tick += 1;
        self.notify(tick);
        debug!(updates = tick, "monitor finished");
        tick
    }
}
