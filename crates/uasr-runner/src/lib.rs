//! Step execution and the fixed stage drivers.
//!
//! The pipeline is a hand-ordered sequence of external tool invocations.
//! Everything here is single-threaded and blocking; re-running a stage is
//! safe because completed steps are skipped via the checkpoint store.

pub mod command;
pub mod runner;
pub mod stages;

use anyhow::Result;
use uasr_core::{CheckpointStore, PipelineConfig, PipelinePaths};

/// Immutable per-invocation state, built once and passed by reference to
/// every step.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub paths: PipelinePaths,
    pub store: CheckpointStore,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let paths = PipelinePaths::new(&config.output_dir);
        paths.prepare()?;
        let store = CheckpointStore::open_in(&paths.checkpoint_dir);
        Ok(Self {
            config,
            paths,
            store,
        })
    }
}
