// src/engine/lifecycle.rs

//! Engine lifecycle state machine.
//!
//! ```text
//! Built -> Starting -> Running -> Stopping -> Drained -> Cleaned
//!    \         \______________________________________/^
//!     \___________________ stop() before start ________/
//! ```
//!
//! The decision functions ([`on_start`], [`on_stop`]) are pure and tested
//! without Tokio. [`Lifecycle`] stores the current state in a `watch`
//! channel so callers can wait for a terminal state.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineState {
    /// Graph frozen, nothing prepared yet.
    Built,
    /// Components are being prepared.
    Starting,
    /// Worker pools and the monitor are running.
    Running,
    /// Producers are winding down; downstream stages drain their inputs.
    Stopping,
    /// Every worker has exited; no unit is left in any channel.
    Drained,
    /// Components are cleaned up. Terminal.
    Cleaned,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Built => "built",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Drained => "drained",
            EngineState::Cleaned => "cleaned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Cleaned)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `stop()` should do in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    /// Never started: close directly, nothing to clean.
    Close,
    /// Start is in progress: raise the stop flag; start will see it.
    Defer,
    /// Raise the stop flag and move to `Stopping`.
    BeginStopping,
    /// Already stopping or drained.
    Ignore,
    /// Engine is closed.
    Reject,
}

pub fn on_stop(state: EngineState) -> StopAction {
    match state {
        EngineState::Built => StopAction::Close,
        EngineState::Starting => StopAction::Defer,
        EngineState::Running => StopAction::BeginStopping,
        EngineState::Stopping | EngineState::Drained => StopAction::Ignore,
        EngineState::Cleaned => StopAction::Reject,
    }
}

/// Whether `start()` may proceed from `state`.
pub fn on_start(state: EngineState) -> Result<(), EngineError> {
    match state {
        EngineState::Built => Ok(()),
        EngineState::Cleaned => Err(EngineError::Closed),
        _ => Err(EngineError::AlreadyStarted),
    }
}

/// Shared, observable lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<EngineState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EngineState::Built);
        Self { tx }
    }

    pub fn state(&self) -> EngineState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.tx.subscribe()
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the state observed before the call, or the current state as
    /// the error when the transition was not allowed.
    pub fn advance(&self, from: &[EngineState], to: EngineState) -> Result<EngineState, EngineState> {
        let mut observed = EngineState::Built;
        let changed = self.tx.send_if_modified(|state| {
            observed = *state;
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        });

        if changed {
            debug!(from = %observed, to = %to, "engine state changed");
            Ok(observed)
        } else {
            Err(observed)
        }
    }

    /// Wait until the engine reaches `target` or any later state.
    pub async fn wait_for(&self, target: EngineState) -> EngineState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| *state >= target).await {
            Ok(state) => *state,
            // The sender lives as long as `self`, so this cannot close early.
            Err(_) => self.state(),
        }
    }
}
