//! Idempotent execution of named steps against the checkpoint store.

use anyhow::{Context, Result};
use tracing::info;
use uasr_core::CheckpointStore;

/// One named unit of work in a stage's fixed sequence.
pub struct Step<'a> {
    pub name: &'static str,
    pub work: Box<dyn FnOnce() -> Result<()> + 'a>,
}

impl<'a> Step<'a> {
    pub fn new(name: &'static str, work: impl FnOnce() -> Result<()> + 'a) -> Self {
        Self {
            name,
            work: Box::new(work),
        }
    }
}

/// Run one step with skip/resume semantics.
///
/// The completion check comes before any write so that re-entry after a
/// crash performs zero side effects for finished work. On failure the step
/// stays `IN_PROGRESS` and the error aborts the stage; the next invocation
/// retries it.
pub fn run_step<F>(store: &CheckpointStore, name: &str, work: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    if store.is_completed(name) {
        info!(step = name, "already completed, skipping");
        return Ok(());
    }
    store.mark_in_progress(name);
    info!(step = name, "running");
    work().with_context(|| format!("step '{}' failed", name))?;
    store.mark_completed(name);
    info!(step = name, "completed");
    Ok(())
}

/// Run a fixed sequence of steps, halting at the first failure.
pub fn run_stage(store: &CheckpointStore, stage: &str, steps: Vec<Step<'_>>) -> Result<()> {
    info!(stage, steps = steps.len(), "starting stage");
    for step in steps {
        run_step(store, step.name, step.work)?;
    }
    info!(stage, "stage finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;
    use std::fs;
    use std::path::PathBuf;
    use uasr_core::{ensure_dir, StepStatus};

    fn temp_store(tag: &str) -> (PathBuf, CheckpointStore) {
        let dir = std::env::temp_dir().join(format!(
            "uasr_runner_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        ensure_dir(&dir).expect("temp dir");
        (dir.clone(), CheckpointStore::open_in(&dir))
    }

    #[test]
    fn completed_step_is_skipped_without_invocation() {
        let (dir, store) = temp_store("skip");
        store.mark_completed("manifest");
        let calls = Cell::new(0u32);
        run_step(&store, "manifest", || {
            calls.set(calls.get() + 1);
            Ok(())
        })
        .expect("skip returns success");
        assert_eq!(calls.get(), 0);
        assert!(!store.is_in_progress("manifest"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn success_marks_completed() {
        let (dir, store) = temp_store("complete");
        run_step(&store, "vads", || Ok(())).expect("step succeeds");
        assert!(store.is_completed("vads"));
        assert!(!store.is_in_progress("vads"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn failure_leaves_step_in_progress_for_retry() {
        let (dir, store) = temp_store("failure");
        let err = run_step(&store, "train_gan", || Err(anyhow!("tool exited 1")))
            .expect_err("step must fail");
        assert!(err.to_string().contains("train_gan"));
        assert!(store.is_in_progress("train_gan"));
        assert!(!store.is_completed("train_gan"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn stage_halts_at_first_failure_and_resumes_past_completed_steps() {
        let (dir, store) = temp_store("stage");
        let ran: Cell<(u32, u32, u32)> = Cell::new((0, 0, 0));

        let first = vec![
            Step::new("a", || {
                let (a, b, c) = ran.get();
                ran.set((a + 1, b, c));
                Ok(())
            }),
            Step::new("b", || {
                let (a, b, c) = ran.get();
                ran.set((a, b + 1, c));
                Err(anyhow!("exit status 1"))
            }),
            Step::new("c", || {
                let (a, b, c) = ran.get();
                ran.set((a, b, c + 1));
                Ok(())
            }),
        ];
        run_stage(&store, "setup", first).expect_err("b fails the stage");
        assert_eq!(ran.get(), (1, 1, 0));
        assert_eq!(
            store.statuses(),
            vec![
                ("a".to_string(), StepStatus::Completed),
                ("b".to_string(), StepStatus::InProgress),
            ]
        );

        let second = vec![
            Step::new("a", || {
                let (a, b, c) = ran.get();
                ran.set((a + 1, b, c));
                Ok(())
            }),
            Step::new("b", || {
                let (a, b, c) = ran.get();
                ran.set((a, b + 1, c));
                Ok(())
            }),
            Step::new("c", || {
                let (a, b, c) = ran.get();
                ran.set((a, b, c + 1));
                Ok(())
            }),
        ];
        run_stage(&store, "setup", second).expect("retry succeeds");
        // a skipped, b retried, c ran for the first time
        assert_eq!(ran.get(), (1, 2, 1));
        assert!(store.is_completed("c"));
        let _ = fs::remove_dir_all(dir);
    }
}
