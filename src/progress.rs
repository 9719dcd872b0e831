//! Per-Runnable progress reports
//!
//! Handed to the Task and controller hooks after every Runnable. The
//! elapsed figure may be extrapolated from the cost estimate rather than
//! measured, so consumers must tolerate a newer snapshot reporting less
//! elapsed time than an older one.

use serde::{Deserialize, Serialize};

/// Point-in-time progress of one Runner incarnation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Microseconds since the incarnation started
    pub elapsed_usec: f64,
    /// True when `elapsed_usec` was extrapolated instead of measured
    pub elapsed_is_estimated: bool,
    /// Runnables executed this incarnation (successes and failures)
    pub runnables_executed: u64,
    /// Estimated Runnables left in this incarnation's budget
    pub estimated_remaining: u64,
}

impl ProgressSnapshot {
    /// Snapshot taken at incarnation start, before any Runnable ran.
    pub fn initial() -> Self {
        Self {
            elapsed_usec: 0.0,
            elapsed_is_estimated: false,
            runnables_executed: 0,
            estimated_remaining: 0,
        }
    }

    /// Derive an extrapolated snapshot: one more Runnable executed,
    /// elapsed advanced by the cost estimate, no clock read.
    pub fn extrapolate(&self, cost_estimate_usec: f64, remaining: u64) -> Self {
        Self {
            elapsed_usec: self.elapsed_usec + cost_estimate_usec,
            elapsed_is_estimated: true,
            runnables_executed: self.runnables_executed + 1,
            estimated_remaining: remaining,
        }
    }
}
