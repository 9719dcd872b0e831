//! Task and Runnable ports plus the striped id iterator
//!
//! A Task is the business logic: it constructs Runnables lazily, reacts
//! to their completion/failure, and declares how results are reduced and
//! combined. The core never retries a Runnable; retry policy, if any,
//! belongs to the Task.

use serde_json::Value;

use crate::aggregator::ResultAggregator;
use crate::state::TaskInstanceState;

/// One indivisible unit of work with a strictly ordered numeric identity
pub trait Runnable {
    fn id(&self) -> u64;

    /// Execute once. Failures are opaque to the core: they are reported
    /// through the Task/controller error hooks and consume the same
    /// pacing slot as a success.
    fn run(&self) -> anyhow::Result<Value>;
}

/// Business logic of a batch, decomposed into Runnables
pub trait Task {
    /// Lazily construct the Runnable with the given id. Called
    /// immediately before execution; the instance is discarded once its
    /// result is consumed.
    fn runnable(&self, state: &TaskInstanceState, runnable_id: u64) -> Box<dyn Runnable>;

    /// Success hook; record the result into the aggregator if it should
    /// participate in reduction.
    fn on_runnable_complete(
        &self,
        runnable: &dyn Runnable,
        result: &Value,
        aggregator: &mut ResultAggregator,
    );

    /// Failure hook. The loop continues regardless.
    fn on_runnable_error(&self, runnable: &dyn Runnable, error: &anyhow::Error);

    /// Reduce the incarnation's collected results to a simpler
    /// intermediate value, or None to keep the raw result set.
    fn reduce(&self, aggregator: &ResultAggregator) -> Option<Value>;

    /// Whether any two `reduce` outputs can be folded into one running
    /// value via `update_partial_result`.
    fn supports_unary_partial_result(&self) -> bool {
        false
    }

    /// Fold a new reduced value into the running partial result.
    /// `current` is None on the first fold.
    fn update_partial_result(&self, new: Value, current: Option<Value>) -> Value {
        let _ = current;
        new
    }

    /// Build the Task's final response from the combined results.
    fn assemble_response(&self, final_results: Value) -> Value {
        final_results
    }

    /// Upper bound on concurrent Runners for this Task; 0 = unbounded.
    /// Applied when the TaskInstanceState is constructed.
    fn max_runners(&self) -> usize {
        0
    }
}

/// Resumable round-robin partition of Runnable ids for one Runner.
///
/// Purely a function of (rank, total runners, resume point, total count),
/// so any incarnation reconstructs the identical remaining sequence. The
/// resume point is tri-state: `None` means "no prior incarnation", which
/// must not be conflated with a literal last-completed id of 0.
#[derive(Debug, Clone)]
pub struct StripedIds {
    next: u64,
    stride: u64,
    total: u64,
}

impl StripedIds {
    pub fn new(
        rank: usize,
        num_runners: usize,
        last_completed: Option<u64>,
        num_runnables: i64,
    ) -> Self {
        let stride = num_runners.max(1) as u64;
        let next = match last_completed {
            None => rank as u64,
            Some(id) => id + stride,
        };
        Self {
            next,
            stride,
            total: num_runnables.max(0) as u64,
        }
    }
}

impl Iterator for StripedIds {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.total {
            return None;
        }
        let id = self.next;
        self.next += self.stride;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_incarnation_starts_at_rank() {
        let ids: Vec<u64> = StripedIds::new(1, 3, None, 10).collect();
        assert_eq!(ids, vec![1, 4, 7]);
    }

    #[test]
    fn test_resume_continues_after_last_completed() {
        let ids: Vec<u64> = StripedIds::new(1, 3, Some(4), 10).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn test_last_completed_zero_differs_from_unset() {
        // Single runnable, single runner: id 0 already done means empty.
        let resumed: Vec<u64> = StripedIds::new(0, 1, Some(0), 1).collect();
        assert!(resumed.is_empty());
        // Unset means the first runnable must still be produced.
        let fresh: Vec<u64> = StripedIds::new(0, 1, None, 1).collect();
        assert_eq!(fresh, vec![0]);
    }

    #[test]
    fn test_partition_covers_range_without_overlap() {
        let total = 37;
        let runners = 4;
        let mut seen = vec![false; total as usize];
        for rank in 0..runners {
            for id in StripedIds::new(rank, runners, None, total) {
                assert!(!seen[id as usize], "id {} produced twice", id);
                seen[id as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_negative_count_estimate_yields_empty() {
        let ids: Vec<u64> = StripedIds::new(0, 2, None, -5).collect();
        assert!(ids.is_empty());
    }
}
