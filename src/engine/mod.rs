// src/engine/mod.rs

//! Execution engine.
//!
//! - [`lifecycle`] is the pure state machine deciding what `start`/`stop` do.
//! - [`status`] holds the per-stage counters written by workers.
//! - [`observer`] and [`monitor`] deliver periodic snapshots to observers.
//! - [`runtime`] is the async shell tying graph, pools and monitor together.

pub mod lifecycle;
pub mod monitor;
pub mod observer;
pub mod runtime;
pub mod status;

pub use lifecycle::EngineState;
pub use observer::{EngineSnapshot, EventObserver, StatusLogger, StopAfter};
pub use runtime::{EngineControl, RunReport, StreamEngine};
pub use status::{StageStatus, StatusMap, StatusTable};
pub use crate::types::StopReason;
