//! Pacing engine property tests
//!
//! Budget convergence: with constant per-Runnable cost C and target T,
//! one incarnation executes at least 93% of the theoretical T/C maximum
//! and never exceeds it. Exercised across slow mode, batched fast mode,
//! and alarm-driven fast mode.

use std::sync::Arc;

use paceline::{Clock, MockClock, PacingConfig, PacingEngine};

/// Run an incarnation of constant-cost runnables to budget exhaustion;
/// returns how many executed. `alarm` simulates a 1 Hz ticker.
fn run_constant_cost(cost_usec: f64, target_seconds: u64, alarm: bool) -> u64 {
    let clock = Arc::new(MockClock::new(0.0));
    let config = PacingConfig::new()
        .with_target_seconds(target_seconds)
        .with_alarm_signal(alarm);
    let mut engine = PacingEngine::new(config, Arc::clone(&clock) as Arc<dyn Clock>);

    let mut executed = 0u64;
    let mut last_fire_usec = 0.0;
    while engine.should_continue() {
        clock.advance(cost_usec);
        if alarm && clock.is_armed() {
            // The ticker fires once per elapsed second of mock time.
            let now = executed as f64 * cost_usec + cost_usec;
            if now - last_fire_usec >= 1_000_000.0 {
                clock.fire_alarm();
                last_fire_usec = now;
            }
        }
        engine.record_runnable();
        executed += 1;
        assert!(executed < 10_000_000, "engine failed to stop");
    }
    executed
}

fn assert_converges(cost_usec: f64, target_seconds: u64, alarm: bool) {
    let executed = run_constant_cost(cost_usec, target_seconds, alarm);
    let theoretical = (target_seconds as f64 * 1e6 / cost_usec).floor();
    let floor = (0.93 * theoretical).floor() as u64;
    let ceiling = theoretical as u64;
    assert!(
        executed >= floor && executed <= ceiling,
        "cost {} target {}s alarm {}: executed {} outside [{}, {}]",
        cost_usec,
        target_seconds,
        alarm,
        executed,
        floor,
        ceiling
    );
}

#[test]
fn test_convergence_slow_runnables() {
    // 2 s per runnable, 30 s target: slow mode throughout.
    assert_converges(2_000_000.0, 30, false);
}

#[test]
fn test_convergence_threshold_boundary() {
    // Exactly at the 0.75 s threshold: fast mode, batch size 1.
    assert_converges(750_000.0, 30, false);
}

#[test]
fn test_convergence_fast_runnables_batched() {
    // 100 ms per runnable, batches of 7 between samples.
    assert_converges(100_000.0, 10, false);
}

#[test]
fn test_convergence_sub_millisecond_runnables() {
    // 200 us per runnable: large extrapolation batches.
    assert_converges(200.0, 2, false);
}

#[test]
fn test_convergence_with_alarm_sampling() {
    assert_converges(10_000.0, 5, true);
}

#[test]
fn test_never_exceeds_theoretical_max_across_costs() {
    for cost in [500.0, 5_000.0, 50_000.0, 500_000.0, 1_500_000.0] {
        let executed = run_constant_cost(cost, 10, false);
        let theoretical = (10.0 * 1e6 / cost).floor() as u64;
        assert!(
            executed <= theoretical,
            "cost {}: executed {} > theoretical {}",
            cost,
            executed,
            theoretical
        );
    }
}

#[test]
fn test_regression_storm_stops_incarnation() {
    // A clock that only moves backward after the first runnable must
    // stop the incarnation within the regression tolerance, regardless
    // of the huge remaining budget.
    let clock = Arc::new(MockClock::new(10_000_000.0));
    let mut engine = PacingEngine::new(
        PacingConfig::new().with_target_seconds(3_600),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    clock.advance(2_000_000.0);
    engine.record_runnable();
    assert!(engine.should_continue());

    let mut executed = 1u64;
    while engine.should_continue() {
        clock.advance(-1_000.0);
        engine.record_runnable();
        executed += 1;
        assert!(executed < 100, "regression storm not detected");
    }
    assert!(engine.stopped_by_clock_regression());
    // 5 consecutive backward samples after the good one.
    assert_eq!(executed, 6);
}
