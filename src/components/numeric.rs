// src/components/numeric.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::component::{PrepareContext, Produced, Producer, StageFuture};
use crate::components::{setting_delay, setting_u64};
use crate::datum::Datum;
use crate::errors::StageResult;

/// Emits `{"value": n}` for `n` in `0..count`, waiting `delay` before each one.
///
/// All workers of the stage share one sequence, so a stage with parallelism
/// `P` still emits `count` units in total. Without a count the sequence is
/// unbounded and the run ends only on `stop()`.
#[derive(Debug)]
pub struct NumericProducer {
    count: AtomicU64,
    delay_ms: AtomicU64,
    next: AtomicU64,
}

impl Default for NumericProducer {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl NumericProducer {
    pub fn new(count: u64, delay: Duration) -> Self {
        Self {
            count: AtomicU64::new(count),
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
            next: AtomicU64::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(u64::MAX, Duration::ZERO)
    }

    /// Units handed out so far.
    pub fn emitted(&self) -> u64 {
        self.next
            .load(Ordering::Acquire)
            .min(self.count.load(Ordering::Acquire))
    }
}

impl Producer for NumericProducer {
    fn prepare<'a>(&'a self, ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if let Some(count) = setting_u64(ctx, "count")? {
                self.count.store(count, Ordering::Release);
            }
            if let Some(delay) = setting_delay(ctx)? {
                self.delay_ms.store(delay.as_millis() as u64, Ordering::Release);
            }
            debug!(
                stage = %ctx.stage,
                count = self.count.load(Ordering::Acquire),
                delay_ms = self.delay_ms.load(Ordering::Acquire),
                "numeric producer prepared"
            );
            Ok(())
        })
    }

    fn produce(&self) -> StageFuture<'_, StageResult<Produced>> {
        Box::pin(async move {
            if self.next.load(Ordering::Acquire) >= self.count.load(Ordering::Acquire) {
                return Ok(Produced::Exhausted);
            }

            let delay = self.delay_ms.load(Ordering::Acquire);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let n = self.next.fetch_add(1, Ordering::AcqRel);
            if n >= self.count.load(Ordering::Acquire) {
                return Ok(Produced::Exhausted);
            }
            Ok(Produced::Datum(Datum::new(json!({ "value": n })).with_id(n.to_string())))
        })
    }
}
