//! Output directory layout, derived once from the configured output root.

use std::path::{Path, PathBuf};

use crate::ensure_dir;
use crate::error::PipelineError;

pub struct PipelinePaths {
    pub manifest_dir: PathBuf,
    pub clustering_dir: PathBuf,
    pub results_dir: PathBuf,
    pub text_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl PipelinePaths {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            manifest_dir: output_dir.join("manifests"),
            clustering_dir: output_dir.join("clustering"),
            results_dir: output_dir.join("results"),
            text_dir: output_dir.join("text"),
            checkpoint_dir: output_dir.join("checkpoints"),
            log_dir: output_dir.join("logs"),
        }
    }

    /// Create the full layout. Idempotent; runs before the first step of
    /// every stage invocation.
    pub fn prepare(&self) -> Result<(), PipelineError> {
        ensure_dir(&self.manifest_dir)?;
        ensure_dir(&self.clustering_dir)?;
        ensure_dir(&self.results_dir)?;
        ensure_dir(&self.text_dir)?;
        ensure_dir(&self.checkpoint_dir)?;
        ensure_dir(&self.log_dir)?;
        Ok(())
    }
}
