//! In-memory result collection for one incarnation
//!
//! Results are keyed by Runnable id and handed to `Task::reduce` after
//! the loop. Iteration order carries no meaning for correctness, but a
//! BTreeMap keeps folds deterministic across runs.

use std::collections::BTreeMap;

use serde_json::Value;

/// Accumulates per-Runnable results for one Runner incarnation
#[derive(Debug, Default)]
pub struct ResultAggregator {
    collected: BTreeMap<u64, Value>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result under its Runnable id. Ids are unique within an
    /// incarnation, so overwrites do not occur in practice.
    pub fn collect(&mut self, runnable_id: u64, result: Value) {
        self.collected.insert(runnable_id, result);
    }

    pub fn count(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    /// Full id → result view for reduction.
    pub fn results(&self) -> &BTreeMap<u64, Value> {
        &self.collected
    }

    /// Consume the aggregator, yielding the raw result set.
    pub fn into_results(self) -> BTreeMap<u64, Value> {
        self.collected
    }
}
