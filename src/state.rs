//! Cross-incarnation Task descriptor
//!
//! One value shared by every Runner incarnation working a Task. Callers
//! persist it when scheduling the Task and must rehydrate it identically
//! for every incarnation until the Task completes.
//!
//! The runnable-count estimate is updated through signed deltas and the
//! deltas are additive: when several Runners adjust it concurrently, the
//! owning store must read-merge-write the deltas, never last-writer-wins.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PacelineError;

/// Shared descriptor of one Task's execution across Runners/incarnations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstanceState {
    task_id: u64,
    /// Unique runner ids, sorted ascending; fixed for the Task's lifetime
    runner_ids: Vec<u32>,
    /// Estimated total Runnable count (signed: deltas may shrink it)
    num_runnables: i64,
    /// Advisory owner/session tag; not consulted by the core
    owner_session: Arc<str>,
    /// Unpersisted delta since the last snapshot
    #[serde(skip)]
    has_updates: bool,
}

impl TaskInstanceState {
    /// Create the descriptor for a newly scheduled Task.
    ///
    /// `declared_runners` must match `runner_ids.len()` before the
    /// `max_runners` cap is applied; a mismatch is fatal, never silently
    /// truncated. `max_runners == 0` means unbounded.
    pub fn new(
        task_id: u64,
        declared_runners: usize,
        mut runner_ids: Vec<u32>,
        owner_session: impl Into<Arc<str>>,
        max_runners: usize,
    ) -> Result<Self, PacelineError> {
        if runner_ids.len() != declared_runners {
            return Err(PacelineError::RunnerCountMismatch {
                declared: declared_runners,
                actual: runner_ids.len(),
            });
        }
        runner_ids.sort_unstable();
        if let Some(dup) = runner_ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(PacelineError::DuplicateRunnerId { runner_id: dup[0] });
        }
        if max_runners > 0 && runner_ids.len() > max_runners {
            runner_ids.truncate(max_runners);
        }
        Ok(Self {
            task_id,
            runner_ids,
            num_runnables: 0,
            owner_session: owner_session.into(),
            has_updates: false,
        })
    }

    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    pub fn runner_ids(&self) -> &[u32] {
        &self.runner_ids
    }

    pub fn num_runners(&self) -> usize {
        self.runner_ids.len()
    }

    /// Zero-based rank of a runner id in the sorted id set, or None when
    /// the id does not belong to this Task.
    pub fn rank_of(&self, runner_id: u32) -> Option<usize> {
        self.runner_ids.binary_search(&runner_id).ok()
    }

    pub fn num_runnables(&self) -> i64 {
        self.num_runnables
    }

    /// Apply a signed delta to the runnable-count estimate and mark the
    /// state dirty until the owner persists a fresh snapshot.
    pub fn update_num_runnables(&mut self, delta: i64) {
        self.num_runnables += delta;
        self.has_updates = true;
    }

    pub fn has_updates(&self) -> bool {
        self.has_updates
    }

    /// Owner acknowledges the current snapshot has been persisted.
    pub fn mark_persisted(&mut self) {
        self.has_updates = false;
    }

    pub fn owner_session(&self) -> &str {
        &self.owner_session
    }
}
