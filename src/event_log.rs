//! Event sourcing for batch execution
//!
//! Append-only audit trail of one process's Runner activity.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: incarnation / runnable / task levels
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the batch execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since log creation (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All event types across the three levels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // INCARNATION LEVEL
    // ═══════════════════════════════════════════
    IncarnationStarted {
        task_id: u64,
        runner_id: u32,
        /// Resume point loaded from the store, if any
        resume_after: Option<u64>,
    },
    IncarnationCheckpointed {
        task_id: u64,
        runner_id: u32,
        last_completed: Option<u64>,
        runner_done: bool,
    },
    BudgetExhausted {
        task_id: u64,
        runner_id: u32,
        runnables_executed: u64,
    },
    ClockRegressionStop {
        task_id: u64,
        runner_id: u32,
    },
    HostAbort {
        task_id: u64,
        runner_id: u32,
    },

    // ═══════════════════════════════════════════
    // RUNNABLE LEVEL
    // ═══════════════════════════════════════════
    RunnableCompleted {
        task_id: u64,
        runner_id: u32,
        runnable_id: u64,
    },
    RunnableFailed {
        task_id: u64,
        runner_id: u32,
        runnable_id: u64,
        error: String,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    UnknownRunner {
        task_id: u64,
        runner_id: u32,
    },
    TaskCompleted {
        task_id: u64,
        runner_id: u32,
        response: Value,
    },
}

impl EventKind {
    /// Task this event belongs to
    pub fn task_id(&self) -> u64 {
        match self {
            Self::IncarnationStarted { task_id, .. }
            | Self::IncarnationCheckpointed { task_id, .. }
            | Self::BudgetExhausted { task_id, .. }
            | Self::ClockRegressionStop { task_id, .. }
            | Self::HostAbort { task_id, .. }
            | Self::RunnableCompleted { task_id, .. }
            | Self::RunnableFailed { task_id, .. }
            | Self::UnknownRunner { task_id, .. }
            | Self::TaskCompleted { task_id, .. } => *task_id,
        }
    }

    /// Check if this is a per-Runnable event
    pub fn is_runnable_event(&self) -> bool {
        matches!(
            self,
            Self::RunnableCompleted { .. } | Self::RunnableFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (typically one per process lifetime)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event); // parking_lot: no unwrap needed
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Filter events by task ID
    pub fn filter_task(&self, task_id: u64) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.task_id() == task_id)
            .collect()
    }

    /// Filter per-Runnable events only
    pub fn runnable_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_runnable_event())
            .collect()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
