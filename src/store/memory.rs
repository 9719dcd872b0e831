//! In-memory state store
//!
//! DashMap-backed adapter for tests and single-process deployments where
//! incarnations are simulated in-process. Each task's record lives under
//! one shard entry, so concurrent runners of the same task serialize on
//! that entry and their updates merge instead of overwriting.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde_json::Value;

use super::{apply_checkpoint, RunnerCheckpoint, RunnerSlot, RunnerState, StateStore};
use crate::error::PacelineError;

#[derive(Debug, Default)]
struct TaskRecord {
    unary: bool,
    runners: BTreeMap<u32, RunnerSlot>,
    contributions: Vec<Value>,
}

/// Concurrent in-memory implementation of the state store port
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: DashMap<u64, TaskRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the store still holds state for the task (i.e. it has
    /// been registered and not yet finalized).
    pub fn has_task(&self, task_id: u64) -> bool {
        self.tasks.contains_key(&task_id)
    }
}

impl StateStore for MemoryStore {
    fn register_task(
        &self,
        task_id: u64,
        runner_ids: &[u32],
        unary: bool,
    ) -> Result<(), PacelineError> {
        let mut record = TaskRecord {
            unary,
            ..Default::default()
        };
        for &id in runner_ids {
            record.runners.insert(id, RunnerSlot::default());
        }
        self.tasks.insert(task_id, record);
        Ok(())
    }

    fn load_runner_state(
        &self,
        task_id: u64,
        runner_id: u32,
    ) -> Result<RunnerState, PacelineError> {
        let record = self
            .tasks
            .get(&task_id)
            .ok_or_else(|| PacelineError::store(format!("task {} not registered", task_id)))?;
        let slot = record.runners.get(&runner_id).cloned().unwrap_or_default();
        Ok(RunnerState {
            last_completed_runnable_id: slot.last_completed,
            partial_result: slot.partial,
            incomplete_runner_ids: record
                .runners
                .iter()
                .filter(|(_, s)| !s.done)
                .map(|(&id, _)| id)
                .collect(),
        })
    }

    fn load_all_results(&self, task_id: u64) -> Result<Vec<Value>, PacelineError> {
        let record = self
            .tasks
            .get(&task_id)
            .ok_or_else(|| PacelineError::store(format!("task {} not registered", task_id)))?;
        if record.unary {
            // Ascending runner id via the BTreeMap.
            Ok(record
                .runners
                .values()
                .filter_map(|s| s.partial.clone())
                .collect())
        } else {
            Ok(record.contributions.clone())
        }
    }

    fn save_runner_state(
        &self,
        task_id: u64,
        runner_id: u32,
        checkpoint: &RunnerCheckpoint,
    ) -> Result<(), PacelineError> {
        let mut record = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| PacelineError::store(format!("task {} not registered", task_id)))?;
        let unary = record.unary;
        let TaskRecord {
            runners,
            contributions,
            ..
        } = &mut *record;
        let slot = runners.entry(runner_id).or_default();
        apply_checkpoint(slot, checkpoint, unary, contributions);
        Ok(())
    }

    fn save_task_finalization(&self, task_id: u64) -> Result<(), PacelineError> {
        self.tasks.remove(&task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checkpoint(last: Option<u64>, contribution: Option<Value>, done: bool) -> RunnerCheckpoint {
        RunnerCheckpoint {
            last_completed_runnable_id: last,
            contribution,
            done,
        }
    }

    #[test]
    fn test_unregistered_task_errors() {
        let store = MemoryStore::new();
        assert!(store.load_runner_state(9, 1).is_err());
        assert!(store.load_all_results(9).is_err());
    }

    #[test]
    fn test_first_incarnation_sees_empty_state() {
        let store = MemoryStore::new();
        store.register_task(1, &[10, 20], true).unwrap();
        let state = store.load_runner_state(1, 10).unwrap();
        assert_eq!(state.last_completed_runnable_id, None);
        assert_eq!(state.partial_result, None);
        assert_eq!(state.incomplete_runner_ids, vec![10, 20]);
    }

    #[test]
    fn test_checkpoint_roundtrip_unary() {
        let store = MemoryStore::new();
        store.register_task(1, &[10, 20], true).unwrap();
        store
            .save_runner_state(1, 10, &checkpoint(Some(4), Some(json!(7)), false))
            .unwrap();
        let state = store.load_runner_state(1, 10).unwrap();
        assert_eq!(state.last_completed_runnable_id, Some(4));
        assert_eq!(state.partial_result, Some(json!(7)));

        // Partial is replaced, not appended.
        store
            .save_runner_state(1, 10, &checkpoint(Some(6), Some(json!(12)), false))
            .unwrap();
        assert_eq!(store.load_all_results(1).unwrap(), vec![json!(12)]);
    }

    #[test]
    fn test_non_unary_contributions_accumulate() {
        let store = MemoryStore::new();
        store.register_task(1, &[10, 20], false).unwrap();
        store
            .save_runner_state(1, 10, &checkpoint(Some(0), Some(json!([1])), false))
            .unwrap();
        store
            .save_runner_state(1, 20, &checkpoint(Some(1), Some(json!([2])), false))
            .unwrap();
        store
            .save_runner_state(1, 10, &checkpoint(Some(2), Some(json!([3])), false))
            .unwrap();
        assert_eq!(
            store.load_all_results(1).unwrap(),
            vec![json!([1]), json!([2]), json!([3])]
        );
    }

    #[test]
    fn test_done_marker_shrinks_incomplete_set() {
        let store = MemoryStore::new();
        store.register_task(1, &[10, 20], true).unwrap();
        store
            .save_runner_state(1, 20, &checkpoint(Some(9), None, true))
            .unwrap();
        let state = store.load_runner_state(1, 10).unwrap();
        assert_eq!(state.incomplete_runner_ids, vec![10]);
    }

    #[test]
    fn test_empty_checkpoint_preserves_resume_point() {
        let store = MemoryStore::new();
        store.register_task(1, &[10], false).unwrap();
        store
            .save_runner_state(1, 10, &checkpoint(Some(5), None, false))
            .unwrap();
        store
            .save_runner_state(1, 10, &checkpoint(None, None, false))
            .unwrap();
        let state = store.load_runner_state(1, 10).unwrap();
        assert_eq!(state.last_completed_runnable_id, Some(5));
    }

    #[test]
    fn test_finalization_discards_state() {
        let store = MemoryStore::new();
        store.register_task(1, &[10], false).unwrap();
        assert!(store.has_task(1));
        store.save_task_finalization(1).unwrap();
        assert!(!store.has_task(1));
    }
}
