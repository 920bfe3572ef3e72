// src/components/sinks.rs

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tracing::info;

use crate::component::{PrepareContext, Sink, StageFuture};
use crate::datum::Datum;
use crate::errors::StageResult;

/// Writes each unit to stdout as one JSON line: `{"id": .., "document": ..}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn consume(&self, datum: Datum) -> StageFuture<'_, StageResult<()>> {
        Box::pin(async move {
            let line = serde_json::to_string(&json!({
                "id": datum.id(),
                "document": datum.document(),
            }))?;
            let mut out = std::io::stdout().lock();
            writeln!(out, "{line}")?;
            Ok(())
        })
    }
}

/// Counts units and logs the total on clean-up.
#[derive(Debug, Default)]
pub struct CountSink {
    stage: std::sync::OnceLock<String>,
    seen: AtomicU64,
}

impl CountSink {
    pub fn count(&self) -> u64 {
        self.seen.load(Ordering::Acquire)
    }
}

impl Sink for CountSink {
    fn prepare<'a>(&'a self, ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let _ = self.stage.set(ctx.stage.clone());
            Ok(())
        })
    }

    fn consume(&self, _datum: Datum) -> StageFuture<'_, StageResult<()>> {
        Box::pin(async move {
            self.seen.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let stage = self.stage.get().map(String::as_str).unwrap_or("count");
            info!(stage, total = self.count(), "count sink finished");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn count_sink_counts() {
        let sink = CountSink::default();
        for n in 0..3 {
            sink.consume(Datum::new(Value::from(n))).await.unwrap();
        }
        assert_eq!(sink.count(), 3);
    }
}
