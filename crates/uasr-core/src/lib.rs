pub mod checkpoint;
pub mod config;
pub mod error;
pub mod paths;

pub use checkpoint::{CheckpointStore, StepStatus};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use paths::PipelinePaths;

use std::fs;
use std::path::Path;

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}
