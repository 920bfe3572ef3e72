// src/component.rs

//! Capability contracts implemented by pluggable stage components.
//!
//! The engine talks to components only through these three traits. Every call
//! takes `&self`: a stage with `parallelism > 1` invokes its component from
//! several workers at once, so implementations keep their mutable state behind
//! atomics or locks.
//!
//! Calls return boxed futures so the traits stay object safe and can be stored
//! as `Arc<dyn Producer>` and friends. `prepare` and `clean_up` have no-op
//! defaults.

use std::future::Future;
use std::pin::Pin;

use crate::datum::Datum;
use crate::errors::StageResult;
use crate::types::StageKind;

/// Boxed future returned by component calls.
pub type StageFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one `produce` call.
#[derive(Debug, Clone)]
pub enum Produced {
    /// A new unit of data.
    Datum(Datum),
    /// Nothing available right now; poll again after a short back-off.
    Idle,
    /// The source has no more data; the calling worker exits.
    Exhausted,
}

/// Configuration handed to `prepare`.
///
/// Built by the engine from the stage declaration. Components read what they
/// need from `settings` and keep their own copy; nothing here is global.
#[derive(Debug, Clone)]
pub struct PrepareContext {
    pub stage: String,
    pub kind: StageKind,
    pub parallelism: usize,
    pub settings: toml::Table,
}

pub trait Producer: Send + Sync {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn produce(&self) -> StageFuture<'_, StageResult<Produced>>;

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub trait Transform: Send + Sync {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Map one unit to zero or more units. An empty vector filters the unit out
    /// and is not an error.
    fn transform(&self, datum: Datum) -> StageFuture<'_, StageResult<Vec<Datum>>>;

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub trait Sink: Send + Sync {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn consume(&self, datum: Datum) -> StageFuture<'_, StageResult<()>>;

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
