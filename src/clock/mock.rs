//! Steppable clock for tests and deterministic simulations
//!
//! Time only moves when the test says so, including backward (to exercise
//! regression handling). The alarm is fired manually.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::Clock;

/// Manually driven clock; shared across threads via atomics
pub struct MockClock {
    now_bits: AtomicU64,
    alarm_fired: AtomicBool,
    alarm_interval_secs: AtomicU64,
    armed: AtomicBool,
    now_calls: AtomicU64,
}

impl MockClock {
    pub fn new(start_usec: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(start_usec.to_bits()),
            alarm_fired: AtomicBool::new(false),
            alarm_interval_secs: AtomicU64::new(0),
            armed: AtomicBool::new(false),
            now_calls: AtomicU64::new(0),
        }
    }

    /// Move the clock forward by `usec`.
    pub fn advance(&self, usec: f64) {
        let now = f64::from_bits(self.now_bits.load(Ordering::Acquire));
        self.set(now + usec);
    }

    /// Set the clock to an absolute value; may move backward.
    pub fn set(&self, usec: f64) {
        self.now_bits.store(usec.to_bits(), Ordering::Release);
    }

    /// Raise the pending-alarm flag as the ticker thread would.
    pub fn fire_alarm(&self) {
        self.alarm_fired.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn armed_interval_secs(&self) -> u64 {
        self.alarm_interval_secs.load(Ordering::Acquire)
    }

    /// Number of `now_usec` reads so far; lets tests assert how often the
    /// engine actually sampled the clock.
    pub fn now_call_count(&self) -> u64 {
        self.now_calls.load(Ordering::Acquire)
    }
}

impl Clock for MockClock {
    fn now_usec(&self) -> f64 {
        self.now_calls.fetch_add(1, Ordering::AcqRel);
        f64::from_bits(self.now_bits.load(Ordering::Acquire))
    }

    fn arm_periodic_alarm(&self, seconds: u64) {
        self.alarm_interval_secs.store(seconds, Ordering::Release);
        self.armed.store(true, Ordering::Release);
        self.alarm_fired.store(false, Ordering::Release);
    }

    fn disarm_alarm(&self) {
        self.armed.store(false, Ordering::Release);
        self.alarm_fired.store(false, Ordering::Release);
    }

    fn poll_pending_alarm(&self) -> bool {
        self.alarm_fired.swap(false, Ordering::AcqRel)
    }
}
