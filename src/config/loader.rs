// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::Result;

/// Read and deserialize a pipeline file.
///
/// No semantic checks happen here; use [`load_and_validate`] for those.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

pub fn parse_str(contents: &str) -> Result<RawPipelineFile> {
    let config: RawPipelineFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a pipeline file and validate it:
///
/// - at least one stage,
/// - engine and per-stage sanity (non-zero capacities and parallelism),
/// - `after` references point at known stages,
/// - no cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw = load_from_path(&path)?;
    let pipeline = PipelineFile::try_from(raw)?;
    Ok(pipeline)
}

/// `Streamgraph.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Streamgraph.toml")
}
