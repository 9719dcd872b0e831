//! Clock port for the pacing engine
//!
//! Wall-clock reads are the pacing engine's only syscall, so the engine
//! works against this trait and the composition root injects a concrete
//! implementation (no process-wide default).
//!
//! The optional periodic alarm is a cheap substitute for polling the
//! clock: when armed, an edge-triggered flag is raised once per interval
//! and consumed via `poll_pending_alarm`. The alarm never interrupts a
//! running Runnable; the engine polls the flag between Runnables.

mod mock;
mod system;

pub use mock::MockClock;
pub use system::SystemClock;

/// Wall-clock source with an optional periodic alarm facility.
///
/// Absence of alarm support is a valid configuration and only affects
/// how often the engine samples the clock, never correctness.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in microseconds.
    fn now_usec(&self) -> f64;

    /// Arm a repeating alarm that raises the pending flag every `seconds`.
    /// Re-arming at a different interval replaces the alarm; at the same
    /// interval the existing one may keep running.
    fn arm_periodic_alarm(&self, seconds: u64);

    /// Cancel the periodic alarm, if armed.
    fn disarm_alarm(&self);

    /// Non-blocking check-and-consume: returns true if the alarm fired
    /// since the last poll, and clears the flag.
    fn poll_pending_alarm(&self) -> bool;
}
