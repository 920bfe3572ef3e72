// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::{Result, StreamgraphError};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = StreamgraphError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        let order = validate_raw_pipeline(&raw)?;
        Ok(PipelineFile::new_unchecked(raw.engine, raw.stage, order))
    }
}

/// Run every check and return the stage names in topological order.
pub fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<Vec<String>> {
    ensure_has_stages(cfg)?;
    validate_engine_config(cfg)?;
    validate_stage_fields(cfg)?;
    validate_stage_dependencies(cfg)?;
    topological_order(cfg)
}

fn ensure_has_stages(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(StreamgraphError::ConfigError(
            "pipeline must contain at least one [stage.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_config(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.engine.queue_capacity == 0 {
        return Err(StreamgraphError::ConfigError(
            "[engine].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.monitor_interval_ms == 0 {
        return Err(StreamgraphError::ConfigError(
            "[engine].monitor_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_stage_fields(cfg: &RawPipelineFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        if stage.parallelism == 0 {
            return Err(StreamgraphError::ConfigError(format!(
                "stage '{}' must have parallelism >= 1 (got 0)",
                name
            )));
        }
        if stage.queue_capacity == Some(0) {
            return Err(StreamgraphError::ConfigError(format!(
                "stage '{}' must have queue_capacity >= 1 (got 0)",
                name
            )));
        }
    }
    Ok(())
}

fn validate_stage_dependencies(cfg: &RawPipelineFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            if dep == name {
                return Err(StreamgraphError::ConfigError(format!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.stage.contains_key(dep) {
                return Err(StreamgraphError::ConfigError(format!(
                    "stage '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn topological_order(cfg: &RawPipelineFile) -> Result<Vec<String>> {
    // Edge direction: upstream -> stage.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(StreamgraphError::DagCycle(format!(
            "cycle detected in pipeline involving stage '{}'",
            cycle.node_id()
        ))),
    }
}
