// src/components/mod.rs

//! Built-in components and the registry that maps pipeline-file component
//! names to them.
//!
//! | name          | kind      | settings                 |
//! |---------------|-----------|--------------------------|
//! | `numeric`     | producer  | `count`, `delay_ms`      |
//! | `lines`       | producer  | `path`                   |
//! | `passthrough` | transform | `delay_ms`               |
//! | `json`        | transform |                          |
//! | `stdout`      | sink      |                          |
//! | `count`       | sink      |                          |

pub mod json;
pub mod lines;
pub mod numeric;
pub mod passthrough;
pub mod registry;
pub mod sinks;

use std::time::Duration;

use anyhow::{Context, bail};

use crate::component::PrepareContext;

pub use json::JsonDecode;
pub use lines::LinesProducer;
pub use numeric::NumericProducer;
pub use passthrough::Passthrough;
pub use registry::{ComponentRegistry, build_graph};
pub use sinks::{CountSink, StdoutSink};

/// Read a non-negative integer setting.
pub(crate) fn setting_u64(ctx: &PrepareContext, key: &str) -> anyhow::Result<Option<u64>> {
    match ctx.settings.get(key) {
        None => Ok(None),
        Some(value) => {
            let n = value
                .as_integer()
                .with_context(|| format!("stage '{}': setting '{key}' must be an integer", ctx.stage))?;
            if n < 0 {
                bail!("stage '{}': setting '{key}' must be >= 0 (got {n})", ctx.stage);
            }
            Ok(Some(n as u64))
        }
    }
}

pub(crate) fn setting_str<'a>(ctx: &'a PrepareContext, key: &str) -> anyhow::Result<Option<&'a str>> {
    match ctx.settings.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .with_context(|| format!("stage '{}': setting '{key}' must be a string", ctx.stage)),
    }
}

pub(crate) fn setting_delay(ctx: &PrepareContext) -> anyhow::Result<Option<Duration>> {
    Ok(setting_u64(ctx, "delay_ms")?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageKind;

    fn ctx(settings: &str) -> PrepareContext {
        PrepareContext {
            stage: "s".to_string(),
            kind: StageKind::Producer,
            parallelism: 1,
            settings: toml::from_str(settings).unwrap(),
        }
    }

    #[test]
    fn reads_integer_and_string_settings() {
        let ctx = ctx("count = 7\npath = \"in.txt\"");
        assert_eq!(setting_u64(&ctx, "count").unwrap(), Some(7));
        assert_eq!(setting_str(&ctx, "path").unwrap(), Some("in.txt"));
        assert_eq!(setting_u64(&ctx, "missing").unwrap(), None);
    }

    #[test]
    fn rejects_mistyped_settings() {
        let ctx = ctx("count = \"seven\"\ndelay_ms = -1");
        assert!(setting_u64(&ctx, "count").is_err());
        assert!(setting_delay(&ctx).is_err());
    }
}
