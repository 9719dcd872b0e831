//! Error types for the scheduler core
//!
//! Only scheduler-invariant violations are surfaced here: malformed
//! instance state, clock pathology, and store failures. Business-logic
//! failures inside a Runnable are opaque `anyhow::Error`s reported through
//! the Task/controller hooks and never abort an incarnation.

use thiserror::Error;

/// Fatal errors for the current incarnation (never for the overall Task)
#[derive(Error, Debug)]
pub enum PacelineError {
    #[error("PACE-010: declared {declared} runners but {actual} runner ids were supplied")]
    RunnerCountMismatch { declared: usize, actual: usize },

    #[error("PACE-011: duplicate runner id {runner_id} in task instance state")]
    DuplicateRunnerId { runner_id: u32 },

    #[error("PACE-030: state store error: {0}")]
    Store(String),

    #[error("PACE-031: IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PACE-032: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PacelineError {
    /// Convenience constructor for store adapter failures
    pub fn store(msg: impl Into<String>) -> Self {
        PacelineError::Store(msg.into())
    }
}
