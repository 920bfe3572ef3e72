#![allow(dead_code)]

use std::fmt::Write;

/// Builds pipeline-file TOML for config tests.
///
/// ```ignore
/// let toml = PipelineTomlBuilder::new()
///     .queue_capacity(4)
///     .stage("src", "numeric", &[])
///     .setting("src", "count", "5")
///     .stage("out", "count", &["src"])
///     .build();
/// ```
#[derive(Debug, Default, Clone)]
pub struct PipelineTomlBuilder {
    engine: Vec<(String, String)>,
    stages: Vec<StageToml>,
}

#[derive(Debug, Clone)]
struct StageToml {
    name: String,
    component: String,
    after: Vec<String>,
    parallelism: Option<usize>,
    settings: Vec<(String, String)>,
}

impl PipelineTomlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.engine.push(("queue_capacity".into(), capacity.to_string()));
        self
    }

    pub fn monitor_interval_ms(mut self, ms: u64) -> Self {
        self.engine.push(("monitor_interval_ms".into(), ms.to_string()));
        self
    }

    pub fn stage(mut self, name: &str, component: &str, after: &[&str]) -> Self {
        self.stages.push(StageToml {
            name: name.to_string(),
            component: component.to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
            parallelism: None,
            settings: Vec::new(),
        });
        self
    }

    pub fn parallelism(mut self, stage: &str, parallelism: usize) -> Self {
        if let Some(s) = self.stages.iter_mut().find(|s| s.name == stage) {
            s.parallelism = Some(parallelism);
        }
        self
    }

    /// `value` is written verbatim, so strings need their own quotes.
    pub fn setting(mut self, stage: &str, key: &str, value: &str) -> Self {
        if let Some(s) = self.stages.iter_mut().find(|s| s.name == stage) {
            s.settings.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn build(self) -> String {
        let mut out = String::new();
        if !self.engine.is_empty() {
            out.push_str("[engine]\n");
            for (key, value) in &self.engine {
                let _ = writeln!(out, "{key} = {value}");
            }
            out.push('\n');
        }
        for stage in &self.stages {
            let _ = writeln!(out, "[stage.{}]", stage.name);
            let _ = writeln!(out, "component = \"{}\"", stage.component);
            if let Some(p) = stage.parallelism {
                let _ = writeln!(out, "parallelism = {p}");
            }
            if !stage.after.is_empty() {
                let after: Vec<String> = stage.after.iter().map(|a| format!("\"{a}\"")).collect();
                let _ = writeln!(out, "after = [{}]", after.join(", "));
            }
            if !stage.settings.is_empty() {
                let _ = writeln!(out, "[stage.{}.settings]", stage.name);
                for (key, value) in &stage.settings {
                    let _ = writeln!(out, "{key} = {value}");
                }
            }
            out.push('\n');
        }
        out
    }
}
