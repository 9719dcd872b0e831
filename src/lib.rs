//! Paceline - self-pacing batch execution across short-lived incarnations
//!
//! A Task is split into small Runnables spread across many bounded
//! Runner incarnations (one per web request, cron tick, ...). The pacing
//! engine adaptively decides how many Runnables fit into each
//! incarnation's wall-clock target; the state store port persists resume
//! points so any future incarnation picks up exactly where the last one
//! stopped.

pub mod aggregator;
pub mod clock;
pub mod controller;
pub mod error;
pub mod event_log;
pub mod pacing;
pub mod progress;
pub mod runner;
pub mod state;
pub mod store;
pub mod task;

pub use aggregator::ResultAggregator;
pub use clock::{Clock, MockClock, SystemClock};
pub use controller::{NoopController, RunnerController};
pub use error::PacelineError;
pub use event_log::{Event, EventKind, EventLog};
pub use pacing::{PacingConfig, PacingEngine};
pub use progress::ProgressSnapshot;
pub use runner::{RunOutcome, Runner};
pub use state::TaskInstanceState;
pub use store::{JsonFileStore, MemoryStore, RunnerCheckpoint, RunnerState, StateStore};
pub use task::{Runnable, StripedIds, Task};
