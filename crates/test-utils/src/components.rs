//! Instrumented components for engine tests.
//!
//! Every component counts its `prepare` and `clean_up` calls so tests can
//! check the lifecycle, and most take an optional per-call delay.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use streamgraph::{Datum, PrepareContext, Produced, Producer, Sink, StageError, StageFuture, StageResult, Transform};

/// `prepare` / `clean_up` call counters.
#[derive(Debug, Default)]
pub struct LifecycleCounts {
    prepared: AtomicUsize,
    cleaned: AtomicUsize,
}

impl LifecycleCounts {
    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    pub fn cleaned(&self) -> usize {
        self.cleaned.load(Ordering::SeqCst)
    }

    fn on_prepare(&self) {
        self.prepared.fetch_add(1, Ordering::SeqCst);
    }

    fn on_clean_up(&self) {
        self.cleaned.fetch_add(1, Ordering::SeqCst);
    }
}

/// The value a test datum carries: `{"value": n}`.
pub fn value_of(datum: &Datum) -> u64 {
    datum.document()["value"].as_u64().unwrap_or(u64::MAX)
}

pub fn numbered(n: u64) -> Datum {
    Datum::new(json!({ "value": n })).with_id(n.to_string())
}

/// Claims the next record first, then waits `delay` before handing it out.
///
/// Counts calls that started but never returned, so a test can tell whether
/// the engine dropped a call midway.
#[derive(Debug)]
pub struct ClaimingProducer {
    total: u64,
    delay: Duration,
    claimed: AtomicU64,
    unfinished: AtomicU64,
}

impl ClaimingProducer {
    pub fn new(total: u64, delay: Duration) -> Self {
        Self {
            total,
            delay,
            claimed: AtomicU64::new(0),
            unfinished: AtomicU64::new(0),
        }
    }

    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::SeqCst).min(self.total)
    }

    /// Calls that were dropped before they returned.
    pub fn unfinished(&self) -> u64 {
        self.unfinished.load(Ordering::SeqCst)
    }
}

struct UnfinishedGuard<'a> {
    counter: &'a AtomicU64,
    armed: bool,
}

impl Drop for UnfinishedGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Producer for ClaimingProducer {
    fn produce(&self) -> StageFuture<'_, StageResult<Produced>> {
        Box::pin(async move {
            let n = self.claimed.fetch_add(1, Ordering::SeqCst);
            if n >= self.total {
                return Ok(Produced::Exhausted);
            }
            let mut guard = UnfinishedGuard {
                counter: &self.unfinished,
                armed: true,
            };
            tokio::time::sleep(self.delay).await;
            guard.armed = false;
            Ok(Produced::Datum(numbered(n)))
        })
    }
}

/// Emits `{"value": offset + n}` for `n` in `0..total`, sleeping `delay`
/// before each unit.
#[derive(Debug)]
pub struct CountingProducer {
    total: u64,
    offset: u64,
    delay: Duration,
    next: AtomicU64,
    pub lifecycle: LifecycleCounts,
}

impl CountingProducer {
    pub fn new(total: u64) -> Self {
        Self::with_delay(total, Duration::ZERO)
    }

    pub fn with_delay(total: u64, delay: Duration) -> Self {
        Self {
            total,
            offset: 0,
            delay,
            next: AtomicU64::new(0),
            lifecycle: LifecycleCounts::default(),
        }
    }

    /// Start numbering at `offset`, so merged producers emit distinct values.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn emitted(&self) -> u64 {
        self.next.load(Ordering::SeqCst).min(self.total)
    }
}

impl Producer for CountingProducer {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_prepare();
            Ok(())
        })
    }

    fn produce(&self) -> StageFuture<'_, StageResult<Produced>> {
        Box::pin(async move {
            if self.next.load(Ordering::SeqCst) >= self.total {
                return Ok(Produced::Exhausted);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            if n >= self.total {
                return Ok(Produced::Exhausted);
            }
            Ok(Produced::Datum(numbered(self.offset + n)))
        })
    }

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_clean_up();
            Ok(())
        })
    }
}

/// Yields `good` units, then fails fatally.
#[derive(Debug)]
pub struct FatalProducer {
    good: u64,
    next: AtomicU64,
}

impl FatalProducer {
    pub fn new(good: u64) -> Self {
        Self {
            good,
            next: AtomicU64::new(0),
        }
    }
}

impl Producer for FatalProducer {
    fn produce(&self) -> StageFuture<'_, StageResult<Produced>> {
        Box::pin(async move {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            if n < self.good {
                Ok(Produced::Datum(numbered(n)))
            } else {
                Err(StageError::fatal(anyhow::anyhow!("source connection lost")))
            }
        })
    }
}

/// Forwards units after `delay`, optionally dropping those that fail `keep`.
pub struct CountingTransform {
    delay: Duration,
    keep: Box<dyn Fn(&Datum) -> bool + Send + Sync>,
    seen: AtomicU64,
    pub lifecycle: LifecycleCounts,
}

impl std::fmt::Debug for CountingTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingTransform")
            .field("delay", &self.delay)
            .field("seen", &self.seen())
            .finish_non_exhaustive()
    }
}

impl Default for CountingTransform {
    fn default() -> Self {
        Self::with_delay(Duration::ZERO)
    }
}

impl CountingTransform {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            keep: Box::new(|_| true),
            seen: AtomicU64::new(0),
            lifecycle: LifecycleCounts::default(),
        }
    }

    pub fn filtering(keep: impl Fn(&Datum) -> bool + Send + Sync + 'static) -> Self {
        Self {
            keep: Box::new(keep),
            ..Self::default()
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::SeqCst)
    }
}

impl Transform for CountingTransform {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_prepare();
            Ok(())
        })
    }

    fn transform(&self, datum: Datum) -> StageFuture<'_, StageResult<Vec<Datum>>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.fetch_add(1, Ordering::SeqCst);
            if (self.keep)(&datum) {
                Ok(vec![datum])
            } else {
                Ok(Vec::new())
            }
        })
    }

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_clean_up();
            Ok(())
        })
    }
}

/// Panics on units whose value is in `bad`; forwards the rest.
#[derive(Debug)]
pub struct PanickingTransform {
    bad: Vec<u64>,
}

impl PanickingTransform {
    pub fn on_values(bad: impl Into<Vec<u64>>) -> Self {
        Self { bad: bad.into() }
    }
}

impl Transform for PanickingTransform {
    fn transform(&self, datum: Datum) -> StageFuture<'_, StageResult<Vec<Datum>>> {
        Box::pin(async move {
            let value = value_of(&datum);
            if self.bad.contains(&value) {
                panic!("refusing value {value}");
            }
            Ok(vec![datum])
        })
    }
}

/// Stores every unit it consumes, sleeping `delay` per unit.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delay: Duration,
    received: Mutex<Vec<Datum>>,
    pub lifecycle: LifecycleCounts,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn received(&self) -> Vec<Datum> {
        self.received.lock().unwrap().clone()
    }

    /// Consumed values, sorted.
    pub fn sorted_values(&self) -> Vec<u64> {
        let mut values: Vec<u64> = self.received().iter().map(value_of).collect();
        values.sort_unstable();
        values
    }
}

impl Sink for RecordingSink {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_prepare();
            Ok(())
        })
    }

    fn consume(&self, datum: Datum) -> StageFuture<'_, StageResult<()>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.received.lock().unwrap().push(datum);
            Ok(())
        })
    }

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_clean_up();
            Ok(())
        })
    }
}

/// Fails every unit whose value is a multiple of `every`.
#[derive(Debug)]
pub struct FailingSink {
    every: u64,
    ok: AtomicU64,
}

impl FailingSink {
    pub fn every(every: u64) -> Self {
        Self {
            every: every.max(1),
            ok: AtomicU64::new(0),
        }
    }

    pub fn accepted(&self) -> u64 {
        self.ok.load(Ordering::SeqCst)
    }
}

impl Sink for FailingSink {
    fn consume(&self, datum: Datum) -> StageFuture<'_, StageResult<()>> {
        Box::pin(async move {
            let value = value_of(&datum);
            if value % self.every == 0 {
                return Err(StageError::failed(anyhow::anyhow!("rejected value {value}")));
            }
            self.ok.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// A sink whose `prepare` always fails.
#[derive(Debug, Default)]
pub struct FailingPrepare {
    pub lifecycle: LifecycleCounts,
    consumed: AtomicBool,
}

impl FailingPrepare {
    pub fn consumed_anything(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }
}

impl Sink for FailingPrepare {
    fn prepare<'a>(&'a self, _ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_prepare();
            anyhow::bail!("credentials missing")
        })
    }

    fn consume(&self, _datum: Datum) -> StageFuture<'_, StageResult<()>> {
        Box::pin(async move {
            self.consumed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.lifecycle.on_clean_up();
            Ok(())
        })
    }
}
