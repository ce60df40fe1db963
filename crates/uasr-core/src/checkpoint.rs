//! Durable record of step completion, backed by `progress.checkpoint`.
//!
//! The file is an append-only log of `name:STATUS` transitions. Queries
//! replay it with "last transition per name wins"; `COMPLETED` is monotonic
//! because `is_completed` matches any completed line regardless of what was
//! appended afterwards.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::error::PipelineError;

pub const CHECKPOINT_FILE: &str = "progress.checkpoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Completed => "COMPLETED",
        }
    }

    fn parse(token: &str) -> Option<StepStatus> {
        match token {
            "IN_PROGRESS" => Some(StepStatus::InProgress),
            "COMPLETED" => Some(StepStatus::Completed),
            _ => None,
        }
    }
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open_in(dir: &Path) -> Self {
        Self::new(dir.join(CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that `name` is about to run. Any stale `IN_PROGRESS` line for
    /// the same name is dropped first so repeated retries do not accumulate.
    /// Best-effort: a write failure must never abort the pipeline, it only
    /// costs resume coverage.
    pub fn mark_in_progress(&self, name: &str) {
        if let Err(err) = self.rewrite_in_progress(name) {
            warn!(step = name, error = %err, "checkpoint write failed; this step will not resume-skip");
        }
    }

    /// Record confirmed success of `name`. Only called after the external
    /// tool reported success.
    pub fn mark_completed(&self, name: &str) {
        if let Err(err) = self.append_line(&format!("{}:{}", name, StepStatus::Completed.as_str())) {
            warn!(step = name, error = %err, "checkpoint write failed; step will re-run next time");
        }
    }

    /// True iff `name` has ever completed. A missing store file means an
    /// untouched run directory, not an error.
    pub fn is_completed(&self, name: &str) -> bool {
        let completed = format!("{}:{}", name, StepStatus::Completed.as_str());
        self.read_lines().iter().any(|l| l.trim() == completed)
    }

    /// True iff the last recorded transition for `name` is `IN_PROGRESS`.
    /// Operator inspection only; the driver never acts on it.
    pub fn is_in_progress(&self, name: &str) -> bool {
        self.transitions()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, status)| status == StepStatus::InProgress)
            .unwrap_or(false)
    }

    /// Replay the log: one status per step, in first-transition order.
    /// `COMPLETED` dominates so that compaction never reverts a finished
    /// step, even if someone re-marked it in progress afterwards.
    pub fn statuses(&self) -> Vec<(String, StepStatus)> {
        let mut order: Vec<String> = Vec::new();
        let mut last: Vec<(String, StepStatus)> = Vec::new();
        for (name, status) in self.transitions() {
            match last.iter_mut().find(|(n, _)| *n == name) {
                Some(entry) => {
                    if entry.1 != StepStatus::Completed {
                        entry.1 = status;
                    }
                }
                None => {
                    order.push(name.clone());
                    last.push((name, status));
                }
            }
        }
        order
            .into_iter()
            .filter_map(|name| {
                last.iter()
                    .find(|(n, _)| *n == name)
                    .map(|(n, s)| (n.clone(), *s))
            })
            .collect()
    }

    /// Rewrite the store to one line per step (the replayed final status).
    /// Malformed lines are dropped in the process.
    pub fn compact(&self) -> Result<usize, PipelineError> {
        let statuses = self.statuses();
        let mut body = String::new();
        for (name, status) in &statuses {
            body.push_str(name);
            body.push(':');
            body.push_str(status.as_str());
            body.push('\n');
        }
        self.atomic_rewrite(body.as_bytes())?;
        Ok(statuses.len())
    }

    fn rewrite_in_progress(&self, name: &str) -> std::io::Result<()> {
        let line = format!("{}:{}", name, StepStatus::InProgress.as_str());
        let mut lines = self.read_lines();
        lines.retain(|l| l.trim() != line);
        lines.push(line);
        let mut body = lines.join("\n");
        body.push('\n');
        self.atomic_rewrite(body.as_bytes())
    }

    /// Full-file rewrites go through a temp file plus rename so an
    /// interrupted write can never leave a truncated store behind.
    fn atomic_rewrite(&self, body: &[u8]) -> std::io::Result<()> {
        let name = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(CHECKPOINT_FILE);
        let tmp = self.path.with_file_name(format!(
            ".{}.tmp.{}.{}",
            name,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(body)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }

    fn read_lines(&self) -> Vec<String> {
        match fs::read_to_string(&self.path) {
            Ok(data) => data
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Parsed transitions in file order. Lines that are not `name:STATUS`
    /// are ignored (corruption tolerance).
    fn transitions(&self) -> Vec<(String, StepStatus)> {
        self.read_lines()
            .iter()
            .filter_map(|line| {
                let (name, status) = line.trim().split_once(':')?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), StepStatus::parse(status)?))
            })
            .collect()
    }
}
