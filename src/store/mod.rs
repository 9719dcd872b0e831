//! State store port
//!
//! Owns everything that outlives an incarnation: resume points, partial
//! results, and per-runner done markers. Keyed by (task id, runner id) so
//! any future incarnation with the same runner id can pick up where the
//! last one stopped, until the task is finalized.
//!
//! Concurrency contract: `save_runner_state` for distinct runner ids may
//! race; done markers and non-unary contributions must accumulate (read-
//! merge-write), never overwrite each other. Everything keyed by a single
//! runner id is written by exactly one Runner at a time.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PacelineError;

/// What a Runner needs back from the store at incarnation start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerState {
    /// Resume point; None on the runner's very first incarnation.
    /// Tri-state on purpose: a literal 0 means Runnable 0 completed.
    pub last_completed_runnable_id: Option<u64>,
    /// Running combined value, only present when the Task supports
    /// unary partial results
    pub partial_result: Option<Value>,
    /// Runner ids that have not yet reported themselves done
    pub incomplete_runner_ids: Vec<u32>,
}

/// What a Runner persists at the end of a non-completing incarnation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerCheckpoint {
    /// Last Runnable that actually finished (not merely attempted)
    pub last_completed_runnable_id: Option<u64>,
    /// This incarnation's contribution: unary partial, reduced value, or
    /// raw result set; None when nothing was collected
    pub contribution: Option<Value>,
    /// True when this runner's partition is exhausted; other runners'
    /// completion checks rely on it
    pub done: bool,
}

/// Persistence port injected into the Runner
pub trait StateStore: Send + Sync {
    /// Seed the store when a Task is scheduled: the full runner id set
    /// (all initially not-done) and whether contributions fold into a
    /// single unary partial per runner.
    fn register_task(
        &self,
        task_id: u64,
        runner_ids: &[u32],
        unary: bool,
    ) -> Result<(), PacelineError>;

    /// Load the runner's resume state; a default (empty last-completed,
    /// full incomplete set) state on the very first incarnation.
    fn load_runner_state(
        &self,
        task_id: u64,
        runner_id: u32,
    ) -> Result<RunnerState, PacelineError>;

    /// All persisted contributions for the task. For unary-partial tasks
    /// this is at most one value per runner, ascending runner id; for
    /// other tasks, every contribution saved so far in insertion order.
    fn load_all_results(&self, task_id: u64) -> Result<Vec<Value>, PacelineError>;

    /// Persist an incarnation's checkpoint for one runner. Unary partials
    /// replace the runner's previous value; other contributions are
    /// appended to the task's collection.
    fn save_runner_state(
        &self,
        task_id: u64,
        runner_id: u32,
        checkpoint: &RunnerCheckpoint,
    ) -> Result<(), PacelineError>;

    /// Discard all state for a completed task.
    fn save_task_finalization(&self, task_id: u64) -> Result<(), PacelineError>;
}

/// Per-runner record shared by the in-tree adapters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RunnerSlot {
    pub last_completed: Option<u64>,
    pub partial: Option<Value>,
    pub done: bool,
}

/// Merge a checkpoint into a runner slot. Additive on purpose: an empty
/// incarnation must not clobber an earlier resume point or done marker.
pub(crate) fn apply_checkpoint(
    slot: &mut RunnerSlot,
    checkpoint: &RunnerCheckpoint,
    unary: bool,
    contributions: &mut Vec<Value>,
) {
    if let Some(id) = checkpoint.last_completed_runnable_id {
        slot.last_completed = Some(id);
    }
    slot.done |= checkpoint.done;
    if let Some(contribution) = &checkpoint.contribution {
        if unary {
            slot.partial = Some(contribution.clone());
        } else {
            contributions.push(contribution.clone());
        }
    }
}
