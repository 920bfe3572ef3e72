// src/engine/status.rs

//! Per-stage counters shared between workers and the monitor.
//!
//! Each stage's counters are written only by that stage's workers, through
//! atomic increments. The monitor and `StreamEngine::status` read them by
//! copying into a [`StageStatus`] value, so observers never see live state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::graph::StreamGraph;
use crate::pool::channel::ChannelDepth;
use crate::types::StageKind;

/// Point-in-time copy of one stage's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStatus {
    pub kind: StageKind,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Workers of this stage that have not exited yet.
    pub active_workers: usize,
    /// Units buffered in this stage's input channel.
    pub queued: usize,
}

/// Status of every stage, keyed by stage name.
pub type StatusMap = BTreeMap<String, StageStatus>;

/// Live counters for one stage.
#[derive(Debug)]
pub struct StageCounters {
    kind: StageKind,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    active_workers: AtomicUsize,
    input_depth: OnceLock<Arc<ChannelDepth>>,
}

impl StageCounters {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            attempted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            input_depth: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the number of workers still running after this one.
    pub fn worker_stopped(&self) -> usize {
        self.active_workers.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    pub(crate) fn attach_input(&self, depth: Arc<ChannelDepth>) {
        let _ = self.input_depth.set(depth);
    }

    pub fn snapshot(&self) -> StageStatus {
        StageStatus {
            kind: self.kind,
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Acquire),
            queued: self.input_depth.get().map_or(0, |d| d.current()),
        }
    }
}

/// Counters for every stage of one engine.
///
/// The set of stages is fixed when the engine is created.
#[derive(Debug, Default)]
pub struct StatusTable {
    stages: BTreeMap<String, Arc<StageCounters>>,
}

impl StatusTable {
    pub fn for_graph(graph: &StreamGraph) -> Self {
        let stages = graph
            .nodes()
            .iter()
            .map(|n| (n.name().to_string(), Arc::new(StageCounters::new(n.kind()))))
            .collect();
        Self { stages }
    }

    pub fn counters(&self, stage: &str) -> Option<Arc<StageCounters>> {
        self.stages.get(stage).cloned()
    }

    pub fn snapshot(&self) -> StatusMap {
        self.stages
            .iter()
            .map(|(name, counters)| (name.clone(), counters.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_counters() {
        let counters = StageCounters::new(StageKind::Sink);
        counters.record_attempt();
        counters.record_success();
        counters.record_attempt();
        counters.record_failure();

        let snap = counters.snapshot();
        assert_eq!(snap.kind, StageKind::Sink);
        assert_eq!((snap.attempted, snap.succeeded, snap.failed), (2, 1, 1));
        assert_eq!(snap.queued, 0);

        counters.record_attempt();
        assert_eq!(snap.attempted, 2, "snapshot must not follow live counters");
    }

    #[test]
    fn worker_stopped_reports_remaining() {
        let counters = StageCounters::new(StageKind::Producer);
        counters.worker_started();
        counters.worker_started();
        assert_eq!(counters.worker_stopped(), 1);
        assert_eq!(counters.worker_stopped(), 0);
        assert_eq!(counters.snapshot().active_workers, 0);
    }
}
