// src/components/lines.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::component::{PrepareContext, Produced, Producer, StageFuture};
use crate::components::setting_str;
use crate::datum::Datum;
use crate::errors::{StageError, StageResult};

/// Emits each line of a text file as a string document, id = line number.
///
/// The file is opened in `prepare` and closed in `clean_up`. A `path` setting
/// takes precedence over the path given to [`LinesProducer::new`].
#[derive(Default)]
pub struct LinesProducer {
    path: Option<PathBuf>,
    reader: Mutex<Option<Lines<BufReader<File>>>>,
    line: AtomicU64,
}

impl fmt::Debug for LinesProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinesProducer")
            .field("path", &self.path)
            .field("line", &self.line.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LinesProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

impl Producer for LinesProducer {
    fn prepare<'a>(&'a self, ctx: &'a PrepareContext) -> StageFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let path = match (setting_str(ctx, "path")?, &self.path) {
                (Some(setting), built_with) => {
                    if let Some(built_with) = built_with {
                        debug!(
                            stage = %ctx.stage,
                            replaced = %built_with.display(),
                            "`path` setting overrides constructor path"
                        );
                    }
                    PathBuf::from(setting)
                }
                (None, Some(built_with)) => built_with.clone(),
                (None, None) => bail!("stage '{}': lines producer needs a `path` setting", ctx.stage),
            };

            let file = File::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            *self.reader.lock().await = Some(BufReader::new(file).lines());
            info!(stage = %ctx.stage, path = %path.display(), "lines producer opened file");
            Ok(())
        })
    }

    fn produce(&self) -> StageFuture<'_, StageResult<Produced>> {
        Box::pin(async move {
            let mut guard = self.reader.lock().await;
            let Some(lines) = guard.as_mut() else {
                return Err(StageError::fatal(anyhow::anyhow!("lines producer is not prepared")));
            };

            match lines.next_line().await? {
                Some(line) => {
                    let n = self.line.fetch_add(1, Ordering::AcqRel) + 1;
                    Ok(Produced::Datum(Datum::new(Value::String(line)).with_id(n.to_string())))
                }
                None => Ok(Produced::Exhausted),
            }
        })
    }

    fn clean_up(&self) -> StageFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.reader.lock().await.take();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageKind;
    use std::io::Write;

    #[tokio::test]
    async fn reads_lines_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();

        let producer = LinesProducer::default();
        let mut settings = toml::Table::new();
        settings.insert(
            "path".to_string(),
            toml::Value::String(file.path().display().to_string()),
        );
        let ctx = PrepareContext {
            stage: "lines".to_string(),
            kind: StageKind::Producer,
            parallelism: 1,
            settings,
        };
        producer.prepare(&ctx).await.unwrap();

        let mut seen = Vec::new();
        while let Produced::Datum(d) = producer.produce().await.unwrap() {
            seen.push((d.id().unwrap().to_string(), d.document().clone()));
        }
        assert_eq!(
            seen,
            vec![
                ("1".to_string(), Value::from("first")),
                ("2".to_string(), Value::from("second")),
            ]
        );
        producer.clean_up().await.unwrap();
    }

    #[tokio::test]
    async fn path_setting_overrides_constructor_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from setting").unwrap();

        let producer = LinesProducer::new("/definitely/not/here.txt");
        let mut settings = toml::Table::new();
        settings.insert(
            "path".to_string(),
            toml::Value::String(file.path().display().to_string()),
        );
        let ctx = PrepareContext {
            stage: "lines".to_string(),
            kind: StageKind::Producer,
            parallelism: 1,
            settings,
        };
        producer.prepare(&ctx).await.unwrap();

        match producer.produce().await.unwrap() {
            Produced::Datum(d) => assert_eq!(d.document(), &Value::from("from setting")),
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prepare_fails_without_path() {
        let ctx = PrepareContext {
            stage: "lines".to_string(),
            kind: StageKind::Producer,
            parallelism: 1,
            settings: toml::Table::new(),
        };
        let err = LinesProducer::default().prepare(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("path"));
    }
}
