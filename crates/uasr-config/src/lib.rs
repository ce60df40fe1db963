//! Structured mutation of external tools' configuration files.
//!
//! Two surfaces: nested YAML documents addressed by dotted path, and flat
//! shell-style `name=value` variable files. Both are whole-file operations,
//! read once, mutated in memory, written once.

pub mod vars;
pub mod yaml;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("config_missing: {0}")]
    MissingFile(PathBuf),

    /// A delete target (or a set through a scalar) did not resolve. Callers
    /// rely on the field having existed, so this is fatal.
    #[error("path_missing: '{path}' does not resolve in the document")]
    MissingPath { path: String },

    #[error("not_a_mapping: segment '{segment}' of '{path}' is not a mapping")]
    NotAMapping { path: String, segment: String },

    #[error("invalid_path: '{0}' is not a dotted key path")]
    InvalidPath(String),

    /// The value cannot be written into a line-oriented file without
    /// corrupting it.
    #[error("unescapable_value: value for '{name}' contains a newline")]
    UnescapableValue { name: String },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
