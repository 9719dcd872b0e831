//! Adaptive pacing engine
//!
//! Decides, after every Runnable, whether the wall clock should be
//! sampled again, maintains the per-Runnable cost estimate, and projects
//! how many more Runnables fit before the incarnation's deadline.
//!
//! Two sampling regimes:
//! - Slow mode (average cost above 0.75 s, or no estimate yet): sample
//!   after every Runnable.
//! - Sub-second mode: sample only when the periodic alarm has fired, or —
//!   without an alarm facility — once a computed batch of Runnables has
//!   elapsed since the last sample. Between samples, snapshots are
//!   extrapolated from the cost estimate without a clock read.
//!
//! A backward-moving clock never updates the estimate; five consecutive
//! regressions force the incarnation to stop.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::progress::ProgressSnapshot;

/// Per-Runnable cost above which every Runnable is individually timed
pub const SUBSECOND_THRESHOLD_USEC: f64 = 750_000.0;

/// Repeating alarm interval used in sub-second mode
pub const ALARM_INTERVAL_SECS: u64 = 1;

/// Runnables at the start of an incarnation that are always timed
const BOOTSTRAP_RUNNABLES: u64 = 5;

/// Fallback incarnation budget when the clock regresses before any
/// budget could be computed
const EARLY_REGRESSION_BUDGET: u64 = 5;

const DEFAULT_TARGET_SECONDS: u64 = 30;
const DEFAULT_MAX_REGRESSIONS: u32 = 5;

/// Tuning knobs for one incarnation's time budget
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Wall-clock target for the whole incarnation, in seconds
    pub target_seconds: u64,
    /// Whether the Clock's periodic alarm facility is usable
    pub alarm_signal_works: bool,
    /// Consecutive backward clock samples tolerated before forcing a stop
    pub max_clock_regressions: u32,
}

impl PacingConfig {
    pub fn new() -> Self {
        Self {
            target_seconds: DEFAULT_TARGET_SECONDS,
            alarm_signal_works: false,
            max_clock_regressions: DEFAULT_MAX_REGRESSIONS,
        }
    }

    /// Set the incarnation wall-clock target
    pub fn with_target_seconds(mut self, seconds: u64) -> Self {
        self.target_seconds = seconds;
        self
    }

    /// Enable alarm-based clock sampling
    pub fn with_alarm_signal(mut self, works: bool) -> Self {
        self.alarm_signal_works = works;
        self
    }

    /// Override the clock-regression tolerance
    pub fn with_max_clock_regressions(mut self, max: u32) -> Self {
        self.max_clock_regressions = max;
        self
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-incarnation scheduling state; never persisted
pub struct PacingEngine {
    config: PacingConfig,
    clock: Arc<dyn Clock>,
    /// Wall time at incarnation start
    start_usec: f64,
    /// Wall time of the last accepted measurement
    last_measured_usec: f64,
    /// Recent average cost: running mean during bootstrap, last interval
    /// average afterwards. Drives the no-alarm batch size.
    recent_avg_usec: f64,
    /// Batch-weighted exponentially-smoothed cost estimate
    estimate_usec: Option<f64>,
    runnables_since_measurement: u64,
    runnables_executed: u64,
    /// Total Runnables this incarnation may execute; None until the first
    /// accepted measurement
    budget: Option<u64>,
    consecutive_regressions: u32,
    subsecond_mode: bool,
    alarm_armed: bool,
    regression_stop: bool,
    last_snapshot: ProgressSnapshot,
}

impl PacingEngine {
    /// Take the incarnation-start measurement and begin in slow mode.
    pub fn new(config: PacingConfig, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now_usec();
        Self {
            config,
            clock,
            start_usec: start,
            last_measured_usec: start,
            recent_avg_usec: 0.0,
            estimate_usec: None,
            runnables_since_measurement: 0,
            runnables_executed: 0,
            budget: None,
            consecutive_regressions: 0,
            subsecond_mode: false,
            alarm_armed: false,
            regression_stop: false,
            last_snapshot: ProgressSnapshot::initial(),
        }
    }

    /// Record that one Runnable finished (success or failure — both
    /// consume the same pacing slot) and report progress. Samples the
    /// clock or extrapolates according to the current mode.
    pub fn record_runnable(&mut self) -> ProgressSnapshot {
        self.runnables_executed += 1;
        self.runnables_since_measurement += 1;

        if self.should_measure() {
            self.measure()
        } else {
            self.extrapolate()
        }
    }

    /// True while the incarnation may keep executing Runnables.
    pub fn should_continue(&self) -> bool {
        if self.regression_stop {
            return false;
        }
        match self.budget {
            Some(budget) => self.runnables_executed < budget,
            None => true,
        }
    }

    /// Whether the engine stopped the incarnation due to a pathological
    /// clock rather than budget exhaustion.
    pub fn stopped_by_clock_regression(&self) -> bool {
        self.regression_stop
    }

    /// Current best per-Runnable cost estimate, if one exists yet.
    pub fn cost_estimate_usec(&self) -> Option<f64> {
        self.estimate_usec
    }

    /// Computed total-Runnables budget for this incarnation, if known.
    pub fn incarnation_budget(&self) -> Option<u64> {
        self.budget
    }

    pub fn runnables_executed(&self) -> u64 {
        self.runnables_executed
    }

    /// Disarm the alarm if this engine armed it. Called when the
    /// incarnation loop exits.
    pub fn shutdown(&mut self) {
        if self.alarm_armed {
            self.clock.disarm_alarm();
            self.alarm_armed = false;
        }
    }

    fn should_measure(&self) -> bool {
        if !self.subsecond_mode {
            return true;
        }
        if self.alarm_armed {
            return self.clock.poll_pending_alarm();
        }
        // Bootstrap: time each of the first few Runnables while the
        // running mean settles.
        if self.runnables_executed <= BOOTSTRAP_RUNNABLES {
            return true;
        }
        let batch = if self.recent_avg_usec > 0.0 {
            ((SUBSECOND_THRESHOLD_USEC / self.recent_avg_usec).floor() as u64).max(1)
        } else {
            1
        };
        self.runnables_since_measurement >= batch
    }

    fn measure(&mut self) -> ProgressSnapshot {
        let now = self.clock.now_usec();

        if now < self.last_measured_usec {
            return self.on_regression();
        }
        self.consecutive_regressions = 0;

        let interval_runnables = self.runnables_since_measurement.max(1) as f64;
        let interval_avg = (now - self.last_measured_usec) / interval_runnables;

        self.recent_avg_usec = if self.runnables_executed <= BOOTSTRAP_RUNNABLES {
            // Running mean over the whole incarnation so far.
            (now - self.start_usec) / self.runnables_executed as f64
        } else {
            interval_avg
        };

        // Batch-weighted smoothing: intervals covering more Runnables
        // carry more weight than the prior estimate.
        self.estimate_usec = Some(match self.estimate_usec {
            None => interval_avg,
            Some(estimate) => {
                let half = interval_runnables / 2.0;
                (estimate * half + interval_avg * interval_runnables)
                    / (interval_runnables + half)
            }
        });

        self.apply_mode(interval_avg);

        let estimate = self.estimate_usec.unwrap_or(interval_avg);
        let elapsed = now - self.start_usec;
        let time_left = self.config.target_seconds as f64 * 1e6 - elapsed;
        // Floor, never round up: overrunning the target is worse than
        // stopping one Runnable early. A zero estimate yields an
        // effectively unbounded count (saturating cast).
        let runnables_left = if time_left <= 0.0 {
            0
        } else {
            (time_left / estimate).floor() as u64
        };
        self.budget = Some(self.runnables_executed.saturating_add(runnables_left));

        self.last_measured_usec = now;
        self.runnables_since_measurement = 0;

        debug!(
            elapsed_usec = elapsed,
            estimate_usec = estimate,
            budget = self.budget,
            subsecond = self.subsecond_mode,
            "clock sampled"
        );

        self.last_snapshot = ProgressSnapshot {
            elapsed_usec: elapsed,
            elapsed_is_estimated: false,
            runnables_executed: self.runnables_executed,
            estimated_remaining: runnables_left,
        };
        self.last_snapshot
    }

    fn apply_mode(&mut self, interval_avg: f64) {
        let subsecond = interval_avg <= SUBSECOND_THRESHOLD_USEC;
        if subsecond != self.subsecond_mode {
            debug!(subsecond, "pacing mode changed");
        }
        self.subsecond_mode = subsecond;

        if subsecond && self.config.alarm_signal_works {
            // Idempotent while armed at this cadence; the clock keeps its
            // ticker running.
            self.clock.arm_periodic_alarm(ALARM_INTERVAL_SECS);
            self.alarm_armed = true;
        } else if self.alarm_armed {
            self.clock.disarm_alarm();
            self.alarm_armed = false;
        }
    }

    fn on_regression(&mut self) -> ProgressSnapshot {
        self.consecutive_regressions += 1;
        warn!(
            consecutive = self.consecutive_regressions,
            "wall clock moved backward; measurement discarded"
        );
        if self.budget.is_none() {
            // No trustworthy budget exists yet; terminate quickly rather
            // than running unbounded on a broken clock.
            self.budget = Some(EARLY_REGRESSION_BUDGET);
        }
        if self.consecutive_regressions >= self.config.max_clock_regressions {
            warn!("clock regression limit reached; stopping incarnation");
            self.regression_stop = true;
        }
        self.extrapolate()
    }

    fn extrapolate(&mut self) -> ProgressSnapshot {
        let estimate = self.estimate_usec.unwrap_or(0.0);
        let remaining = self
            .budget
            .map(|b| b.saturating_sub(self.runnables_executed))
            .unwrap_or(0);
        self.last_snapshot = self.last_snapshot.extrapolate(estimate, remaining);
        // Extrapolation derives executed count from the prior snapshot;
        // keep it in sync with the authoritative counter.
        self.last_snapshot.runnables_executed = self.runnables_executed;
        self.last_snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn engine_with_clock(
        config: PacingConfig,
        start_usec: f64,
    ) -> (PacingEngine, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(start_usec));
        let engine = PacingEngine::new(config, Arc::clone(&clock) as Arc<dyn Clock>);
        (engine, clock)
    }

    #[test]
    fn test_slow_mode_measures_every_runnable() {
        let (mut engine, clock) = engine_with_clock(PacingConfig::new(), 0.0);
        // 1 second per runnable: stays in slow mode.
        for i in 1..=3 {
            clock.advance(1_000_000.0);
            let snapshot = engine.record_runnable();
            assert!(!snapshot.elapsed_is_estimated);
            assert_eq!(snapshot.runnables_executed, i);
        }
        // new() + 3 measurements
        assert_eq!(clock.now_call_count(), 4);
    }

    #[test]
    fn test_budget_stops_at_target() {
        let config = PacingConfig::new().with_target_seconds(10);
        let (mut engine, clock) = engine_with_clock(config, 0.0);
        // 2-second runnables: 5 fit into the 10-second target.
        let mut executed = 0;
        while engine.should_continue() && executed < 100 {
            clock.advance(2_000_000.0);
            engine.record_runnable();
            executed += 1;
        }
        assert_eq!(executed, 5);
    }

    #[test]
    fn test_enters_subsecond_mode_and_batches_samples() {
        let config = PacingConfig::new().with_target_seconds(30);
        let (mut engine, clock) = engine_with_clock(config, 0.0);
        // 100 ms per runnable.
        for _ in 0..BOOTSTRAP_RUNNABLES {
            clock.advance(100_000.0);
            engine.record_runnable();
        }
        let calls_after_bootstrap = clock.now_call_count();
        // Batch size = floor(750_000 / 100_000) = 7: the next 6 runnables
        // must not touch the clock.
        for _ in 0..6 {
            clock.advance(100_000.0);
            let snapshot = engine.record_runnable();
            assert!(snapshot.elapsed_is_estimated);
        }
        assert_eq!(clock.now_call_count(), calls_after_bootstrap);
        // Seventh triggers a real measurement.
        clock.advance(100_000.0);
        let snapshot = engine.record_runnable();
        assert!(!snapshot.elapsed_is_estimated);
        assert_eq!(clock.now_call_count(), calls_after_bootstrap + 1);
    }

    #[test]
    fn test_alarm_mode_samples_only_on_fire() {
        let config = PacingConfig::new().with_alarm_signal(true);
        let (mut engine, clock) = engine_with_clock(config, 0.0);
        // First runnable is timed (slow mode) and flips to sub-second,
        // arming the alarm.
        clock.advance(10_000.0);
        engine.record_runnable();
        assert!(clock.is_armed());
        assert_eq!(clock.armed_interval_secs(), ALARM_INTERVAL_SECS);

        let calls = clock.now_call_count();
        for _ in 0..50 {
            clock.advance(10_000.0);
            let snapshot = engine.record_runnable();
            assert!(snapshot.elapsed_is_estimated);
        }
        assert_eq!(clock.now_call_count(), calls);

        clock.fire_alarm();
        clock.advance(10_000.0);
        let snapshot = engine.record_runnable();
        assert!(!snapshot.elapsed_is_estimated);
        assert_eq!(clock.now_call_count(), calls + 1);
    }

    #[test]
    fn test_slow_runnables_disarm_alarm() {
        let config = PacingConfig::new().with_alarm_signal(true);
        let (mut engine, clock) = engine_with_clock(config, 0.0);
        clock.advance(10_000.0);
        engine.record_runnable();
        assert!(clock.is_armed());

        // Costs jump above the threshold; next fired sample must disarm.
        clock.fire_alarm();
        clock.advance(2_000_000.0);
        engine.record_runnable();
        assert!(!clock.is_armed());
    }

    #[test]
    fn test_ewma_weights_by_batch_size() {
        let (mut engine, clock) = engine_with_clock(PacingConfig::new(), 0.0);
        clock.advance(100.0);
        engine.record_runnable();
        assert_eq!(engine.cost_estimate_usec(), Some(100.0));

        // Second interval: 1 runnable at 400 usec.
        // half = 0.5; estimate = (100*0.5 + 400*1) / 1.5 = 300.
        clock.advance(400.0);
        engine.record_runnable();
        assert_eq!(engine.cost_estimate_usec(), Some(300.0));
    }

    #[test]
    fn test_regression_discards_sample_and_keeps_estimate() {
        let (mut engine, clock) = engine_with_clock(PacingConfig::new(), 1_000_000.0);
        clock.advance(1_000.0);
        engine.record_runnable();
        let estimate = engine.cost_estimate_usec();

        clock.set(0.0); // backward jump
        let snapshot = engine.record_runnable();
        assert!(snapshot.elapsed_is_estimated);
        assert_eq!(engine.cost_estimate_usec(), estimate);
        assert!(engine.should_continue());
    }

    #[test]
    fn test_five_consecutive_regressions_force_stop() {
        // Slow-mode costs so every runnable takes a real measurement.
        let (mut engine, clock) = engine_with_clock(PacingConfig::new(), 1_000_000.0);
        clock.advance(2_000_000.0);
        engine.record_runnable();

        for i in 1..=5 {
            clock.set(1_000_000.0 - i as f64 * 1_000.0);
            engine.record_runnable();
        }
        assert!(!engine.should_continue());
        assert!(engine.stopped_by_clock_regression());
    }

    #[test]
    fn test_forward_sample_resets_regression_count() {
        let (mut engine, clock) = engine_with_clock(PacingConfig::new(), 1_000_000.0);
        clock.advance(2_000_000.0);
        engine.record_runnable();

        for _ in 0..4 {
            clock.set(500_000.0);
            engine.record_runnable();
        }
        // Clock recovers; the consecutive counter resets and further
        // backward samples start counting from zero again.
        clock.set(4_000_000.0);
        engine.record_runnable();
        for _ in 0..4 {
            clock.set(500_000.0);
            engine.record_runnable();
        }
        assert!(!engine.stopped_by_clock_regression());
    }

    #[test]
    fn test_regression_before_any_budget_defaults_small_budget() {
        let (mut engine, clock) = engine_with_clock(PacingConfig::new(), 1_000_000.0);
        clock.set(0.0);
        engine.record_runnable();
        assert_eq!(engine.incarnation_budget(), Some(EARLY_REGRESSION_BUDGET));
    }

    #[test]
    fn test_zero_elapsed_never_exhausts_budget() {
        // Instantaneous runnables with a frozen clock: the budget
        // saturates instead of stopping the incarnation early.
        let (mut engine, _clock) = engine_with_clock(PacingConfig::new(), 0.0);
        for _ in 0..1_000 {
            engine.record_runnable();
            assert!(engine.should_continue());
        }
    }

    #[test]
    fn test_shutdown_disarms_alarm() {
        let config = PacingConfig::new().with_alarm_signal(true);
        let (mut engine, clock) = engine_with_clock(config, 0.0);
        clock.advance(10_000.0);
        engine.record_runnable();
        assert!(clock.is_armed());
        engine.shutdown();
        assert!(!clock.is_armed());
    }

    #[test]
    fn test_config_defaults() {
        let config = PacingConfig::default();
        assert_eq!(config.target_seconds, 30);
        assert!(!config.alarm_signal_works);
        assert_eq!(config.max_clock_regressions, 5);
    }
}
