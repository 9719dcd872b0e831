//! Host controller port
//!
//! The embedding application (an HTTP handler, a CLI, a cron worker)
//! observes the Runner through these hooks and contributes its own
//! liveness signal. The Runner keeps going only while BOTH the pacing
//! engine and `should_continue_running` agree; a host that detects a
//! dropped client connection returns false here and the incarnation
//! checkpoints cleanly between Runnables.

use serde_json::Value;

use crate::progress::ProgressSnapshot;
use crate::task::Runnable;

/// Hooks invoked once per Runnable plus a task-completion notification
pub trait RunnerController: Send + Sync {
    /// Called immediately before a Runnable executes.
    fn before_runnable_started(&self, runnable: &dyn Runnable) {
        let _ = runnable;
    }

    /// Called after a Runnable succeeds, with the latest progress report.
    fn on_runnable_complete(
        &self,
        runnable: &dyn Runnable,
        result: &Value,
        progress: &ProgressSnapshot,
    ) {
        let _ = (runnable, result, progress);
    }

    /// Called after a Runnable fails, with the latest progress report.
    fn on_runnable_error(
        &self,
        runnable: &dyn Runnable,
        error: &anyhow::Error,
        progress: &ProgressSnapshot,
    ) {
        let _ = (runnable, error, progress);
    }

    /// Host-side liveness check, consulted after every Runnable.
    fn should_continue_running(&self) -> bool {
        true
    }

    /// Called exactly once, by the incarnation that completes the Task.
    fn on_task_complete(&self) {}
}

/// Controller with no host-side behavior; never stops the Runner
#[derive(Debug, Default)]
pub struct NoopController;

impl RunnerController for NoopController {}
