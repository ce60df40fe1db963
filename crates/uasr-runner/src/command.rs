//! External tool invocation with per-step log capture.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;
use tracing::debug;
use uasr_core::PipelineError;

/// Wrap a shell snippet. Some of the upstream scripts are driven through
/// stdin/stdout redirection, which only a shell can express.
pub fn shell(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

/// Run `cmd` to completion, streaming its combined output to
/// `<log_dir>/<step>_<timestamp>.log`. Blocking, no timeout: a hung tool
/// hangs the pipeline until the operator intervenes.
pub fn run_tool(step: &str, mut cmd: Command, log_dir: &Path) -> Result<PathBuf, PipelineError> {
    let log_path = log_dir.join(format!(
        "{}_{}.log",
        step,
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let stdout = File::create(&log_path)?;
    let stderr = stdout.try_clone()?;
    debug!(step, log = %log_path.display(), "invoking external tool");
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()?;
    if status.success() {
        Ok(log_path)
    } else {
        Err(PipelineError::StepFailed {
            step: step.to_string(),
            status: status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
        })
    }
}

/// Fail distinguishably when a file a later step depends on is absent even
/// though the producing step reported success.
pub fn require_artifact(path: &Path) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingArtifact(path.to_path_buf()))
    }
}

/// Most recent captured log for `step`, if any run has produced one. The
/// timestamp suffix makes lexicographic order chronological.
pub fn latest_log(log_dir: &Path, step: &str) -> Result<Option<PathBuf>, PipelineError> {
    let prefix = format!("{}_", step);
    let mut newest: Option<(String, PathBuf)> = None;
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".log") {
            continue;
        }
        // Reject longer step names sharing the prefix, e.g. decode_word_1
        // vs decode_word_10.
        let middle = &name[prefix.len()..name.len() - ".log".len()];
        if middle.contains(|c: char| !c.is_ascii_digit() && c != '_') {
            continue;
        }
        if newest.as_ref().map(|(n, _)| name > *n).unwrap_or(true) {
            newest = Some((name, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}
