use std::path::PathBuf;
use thiserror::Error;

/// Failure classes the driver distinguishes when halting a stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An external tool exited non-zero. The step stays IN_PROGRESS in the
    /// checkpoint store so a re-run retries it.
    #[error("step_failed: {step} exited with status {status}")]
    StepFailed { step: String, status: String },

    /// A file the pipeline depends on is absent after the step that should
    /// have produced it reported success.
    #[error("missing_artifact: expected file not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("invalid_config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
