//! JSON-file state store
//!
//! One JSON document per task under a root directory, rewritten on every
//! save (read-merge-write, so repeated incarnations of different runner
//! ids in separate processes accumulate rather than overwrite — callers
//! running truly concurrent processes against the same directory should
//! still partition tasks, as the document rewrite itself is not locked
//! across processes). Suits the demo CLI and cron-style single-runner
//! deployments.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{apply_checkpoint, RunnerCheckpoint, RunnerSlot, RunnerState, StateStore};
use crate::error::PacelineError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDocument {
    unary: bool,
    runners: BTreeMap<u32, RunnerSlot>,
    contributions: Vec<Value>,
}

/// File-backed implementation of the state store port
pub struct JsonFileStore {
    root: PathBuf,
    // Serializes read-merge-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PacelineError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn task_path(&self, task_id: u64) -> PathBuf {
        self.root.join(format!("task-{}.json", task_id))
    }

    fn read_document(&self, task_id: u64) -> Result<TaskDocument, PacelineError> {
        let path = self.task_path(task_id);
        if !path.exists() {
            return Err(PacelineError::store(format!(
                "task {} not registered at {}",
                task_id,
                path.display()
            )));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_document(&self, task_id: u64, doc: &TaskDocument) -> Result<(), PacelineError> {
        let path = self.task_path(task_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// True while a task document exists (registered, not finalized).
    pub fn has_task(&self, task_id: u64) -> bool {
        self.task_path(task_id).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StateStore for JsonFileStore {
    fn register_task(
        &self,
        task_id: u64,
        runner_ids: &[u32],
        unary: bool,
    ) -> Result<(), PacelineError> {
        let _guard = self.write_lock.lock();
        let mut doc = TaskDocument {
            unary,
            ..Default::default()
        };
        for &id in runner_ids {
            doc.runners.insert(id, RunnerSlot::default());
        }
        self.write_document(task_id, &doc)
    }

    fn load_runner_state(
        &self,
        task_id: u64,
        runner_id: u32,
    ) -> Result<RunnerState, PacelineError> {
        let doc = self.read_document(task_id)?;
        let slot = doc.runners.get(&runner_id).cloned().unwrap_or_default();
        Ok(RunnerState {
            last_completed_runnable_id: slot.last_completed,
            partial_result: slot.partial,
            incomplete_runner_ids: doc
                .runners
                .iter()
                .filter(|(_, s)| !s.done)
                .map(|(&id, _)| id)
                .collect(),
        })
    }

    fn load_all_results(&self, task_id: u64) -> Result<Vec<Value>, PacelineError> {
        let doc = self.read_document(task_id)?;
        if doc.unary {
            Ok(doc.runners.values().filter_map(|s| s.partial.clone()).collect())
        } else {
            Ok(doc.contributions)
        }
    }

    fn save_runner_state(
        &self,
        task_id: u64,
        runner_id: u32,
        checkpoint: &RunnerCheckpoint,
    ) -> Result<(), PacelineError> {
        let _guard = self.write_lock.lock();
        let mut doc = self.read_document(task_id)?;
        let unary = doc.unary;
        let TaskDocument {
            runners,
            contributions,
            ..
        } = &mut doc;
        let slot = runners.entry(runner_id).or_default();
        apply_checkpoint(slot, checkpoint, unary, contributions);
        self.write_document(task_id, &doc)
    }

    fn save_task_finalization(&self, task_id: u64) -> Result<(), PacelineError> {
        let _guard = self.write_lock.lock();
        let path = self.task_path(task_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
