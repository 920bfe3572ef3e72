// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine tuning knobs.
///
/// Built in code (`EngineConfig::default().with_queue_capacity(8)`) or read
/// from the `[engine]` table of a pipeline file:
///
/// ```toml
/// [engine]
/// queue_capacity = 100
/// monitor_interval_ms = 500
/// idle_backoff_ms = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Default capacity of every stage input channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How often observers are called.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Pause after an idle or failed `produce` call.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_monitor_interval_ms() -> u64 {
    500
}

fn default_idle_backoff_ms() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            monitor_interval_ms: default_monitor_interval_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
        }
    }
}

impl EngineConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Never zero: a zero-period interval would spin.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// `[stage.<name>]` table.
///
/// ```toml
/// [stage.numbers]
/// component = "numeric"
/// parallelism = 2
/// settings = { count = 100, delay_ms = 5 }
///
/// [stage.out]
/// component = "stdout"
/// after = ["numbers"]
/// queue_capacity = 16
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Registry name of the component (`numeric`, `json`, `stdout`, ...).
    pub component: String,

    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Upstream stages. Empty for producers.
    #[serde(default)]
    pub after: Vec<String>,

    /// Overrides `[engine].queue_capacity` for this stage's input.
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Passed to the component's `prepare` untouched.
    #[serde(default)]
    pub settings: toml::Table,
}

fn default_parallelism() -> usize {
    1
}

/// A pipeline file exactly as deserialized, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// A validated pipeline file.
///
/// Only obtainable through `TryFrom<RawPipelineFile>`, which guarantees the
/// `after` relation is a DAG over known stages.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub engine: EngineConfig,
    pub stage: BTreeMap<String, StageConfig>,
    order: Vec<String>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(
        engine: EngineConfig,
        stage: BTreeMap<String, StageConfig>,
        order: Vec<String>,
    ) -> Self {
        Self {
            engine,
            stage,
            order,
        }
    }

    /// Stage names with every upstream before its downstreams.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Stages in topological order.
    pub fn stages_in_order(&self) -> impl Iterator<Item = (&str, &StageConfig)> {
        self.order
            .iter()
            .filter_map(|name| self.stage.get(name).map(|cfg| (name.as_str(), cfg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_apply_to_empty_table() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.monitor_interval(), Duration::from_millis(500));
        assert_eq!(cfg.idle_backoff(), Duration::from_millis(10));
    }

    #[test]
    fn zero_monitor_interval_is_clamped() {
        let cfg = EngineConfig::default().with_monitor_interval(Duration::ZERO);
        assert_eq!(cfg.monitor_interval(), Duration::from_millis(1));
    }

    #[test]
    fn stage_table_parses_settings() {
        let raw: RawPipelineFile = toml::from_str(
            r#"
            [stage.numbers]
            component = "numeric"
            settings = { count = 3 }

            [stage.out]
            component = "count"
            after = ["numbers"]
            parallelism = 4
            "#,
        )
        .unwrap();

        let numbers = &raw.stage["numbers"];
        assert_eq!(numbers.parallelism, 1);
        assert_eq!(numbers.settings["count"].as_integer(), Some(3));
        assert_eq!(raw.stage["out"].after, vec!["numbers".to_string()]);
        assert_eq!(raw.stage["out"].parallelism, 4);
    }

    #[test]
    fn unknown_stage_keys_are_rejected() {
        let res: Result<RawPipelineFile, _> = toml::from_str(
            r#"
            [stage.a]
            component = "numeric"
            workers = 2
            "#,
        );
        assert!(res.is_err());
    }
}
