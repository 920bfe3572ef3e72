// src/logging.rs

//! Logging setup for `streamgraph` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `STREAMGRAPH_LOG` environment variable (a level such as "debug", or any
//!    `EnvFilter` directive such as "streamgraph::pool=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for sink output.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "STREAMGRAPH_LOG";

const LEVEL_WORDS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = resolve_filter(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    Ok(())
}

fn resolve_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }
    env_value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(normalize_directive(s)).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Lowercase a bare level word ("WARN"); leave full directives untouched,
/// since targets and span field values are case-sensitive.
fn normalize_directive(value: &str) -> String {
    match LEVEL_WORDS.iter().find(|level| level.eq_ignore_ascii_case(value)) {
        Some(level) => (*level).to_string(),
        None => value.to_string(),
    }
}
