// src/config/mod.rs

//! Pipeline files.
//!
//! - `model.rs` is the TOML-backed data model, including [`EngineConfig`].
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` checks references and acyclicity and computes the order
//!   in which stages are handed to the graph builder.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{EngineConfig, PipelineFile, RawPipelineFile, StageConfig};
pub use validate::validate_raw_pipeline;
