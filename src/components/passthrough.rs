// src/components/passthrough.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::component::{PrepareContext, StageFuture, Transform};
use crate::components::setting_delay;
use crate::datum::Datum;
use crate::errors::StageResult;

/// Forwards every unit unchanged, optionally after a delay.
#[derive(Debug, Default)]
pub struct Passthrough {
    delay_ms: AtomicU64,
}

impl Passthrough {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
        }
    }
}

impl Transform for Passthrough {
    fn prepare<'a>(&'a self, ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if let Some(delay) = setting_delay(ctx)? {
                self.delay_ms.store(delay.as_millis() as u64, Ordering::Release);
            }
            Ok(())
        })
    }

    fn transform(&self, datum: Datum) -> StageFuture<'_, StageResult<Vec<Datum>>> {
        Box::pin(async move {
            let delay = self.delay_ms.load(Ordering::Acquire);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Ok(vec![datum])
        })
    }
}
