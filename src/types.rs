// src/types.rs

use std::fmt;
use std::str::FromStr;

/// The role a stage plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    /// Pulls data from somewhere; has no upstreams.
    Producer,
    /// Maps one input unit to zero or more output units.
    Transform,
    /// Consumes units; has no downstreams.
    Sink,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Producer => "producer",
            StageKind::Transform => "transform",
            StageKind::Sink => "sink",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "producer" | "provider" => Ok(StageKind::Producer),
            "transform" | "processor" => Ok(StageKind::Transform),
            "sink" | "writer" => Ok(StageKind::Sink),
            other => Err(format!(
                "invalid stage kind: {other} (expected \"producer\", \"transform\" or \"sink\")"
            )),
        }
    }
}

/// Why a run left the `Running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called (by the caller or an observer).
    Requested,
    /// Every producer worker ran out of data.
    Exhausted,
    /// A component failed to prepare; the run never reached `Running`.
    PrepareFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Requested => "requested",
            StopReason::Exhausted => "exhausted",
            StopReason::PrepareFailed => "prepare failed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
