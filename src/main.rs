//! Paceline CLI - demo driver for self-pacing batch execution
//!
//! Runs a built-in summing Task as a sequence of bounded incarnations,
//! the way an HTTP worker would across many requests, and prints what
//! each incarnation accomplished.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};

use paceline::{
    JsonFileStore, MemoryStore, PacingConfig, ResultAggregator, RunOutcome, Runnable, Runner,
    RunnerController, StateStore, SystemClock, Task, TaskInstanceState,
};

#[derive(Parser)]
#[command(name = "paceline")]
#[command(about = "Self-pacing batch execution across short-lived incarnations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo summing task to completion, incarnation by incarnation
    Run {
        /// Total number of runnables in the task
        #[arg(long, default_value_t = 1_000)]
        items: u64,

        /// Number of runners splitting the task
        #[arg(long, default_value_t = 1)]
        runners: u32,

        /// Wall-clock target per incarnation, in seconds
        #[arg(short, long, default_value_t = 2)]
        target_seconds: u64,

        /// Simulated cost per runnable, in milliseconds
        #[arg(long, default_value_t = 0)]
        cost_ms: u64,

        /// Inject a failure into every Nth runnable (0 = none)
        #[arg(long, default_value_t = 0)]
        fail_every: u64,

        /// Use the periodic-alarm clock sampling path
        #[arg(long)]
        alarm: bool,

        /// Persist state as JSON under this directory (resumable across
        /// process restarts); in-memory when omitted
        #[arg(long)]
        state_dir: Option<String>,
    },
}

// ─────────────────────────────────────────────────────────────
// Demo task: sum of (id + 1) over all runnables
// ─────────────────────────────────────────────────────────────

struct DemoRunnable {
    id: u64,
    cost: Duration,
    fail: bool,
}

impl Runnable for DemoRunnable {
    fn id(&self) -> u64 {
        self.id
    }

    fn run(&self) -> anyhow::Result<Value> {
        if !self.cost.is_zero() {
            thread::sleep(self.cost);
        }
        if self.fail {
            bail!("injected failure for runnable {}", self.id);
        }
        Ok(json!(self.id + 1))
    }
}

struct SumTask {
    cost: Duration,
    fail_every: u64,
}

impl Task for SumTask {
    fn runnable(&self, _state: &TaskInstanceState, runnable_id: u64) -> Box<dyn Runnable> {
        let fail = self.fail_every > 0 && (runnable_id + 1) % self.fail_every == 0;
        Box::new(DemoRunnable {
            id: runnable_id,
            cost: self.cost,
            fail,
        })
    }

    fn on_runnable_complete(
        &self,
        runnable: &dyn Runnable,
        result: &Value,
        aggregator: &mut ResultAggregator,
    ) {
        aggregator.collect(runnable.id(), result.clone());
    }

    fn on_runnable_error(&self, runnable: &dyn Runnable, error: &anyhow::Error) {
        tracing::debug!(runnable_id = runnable.id(), %error, "runnable failed");
    }

    fn reduce(&self, aggregator: &ResultAggregator) -> Option<Value> {
        let sum: u64 = aggregator
            .results()
            .values()
            .filter_map(|v| v.as_u64())
            .sum();
        Some(json!(sum))
    }

    fn supports_unary_partial_result(&self) -> bool {
        true
    }

    fn update_partial_result(&self, new: Value, current: Option<Value>) -> Value {
        let base = current.and_then(|c| c.as_u64()).unwrap_or(0);
        json!(base + new.as_u64().unwrap_or(0))
    }

    fn assemble_response(&self, final_results: Value) -> Value {
        json!({ "sum": final_results })
    }
}

/// Counts hook invocations so the driver can report per-incarnation work
#[derive(Default)]
struct CountingController {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl CountingController {
    fn take(&self) -> (u64, u64) {
        (
            self.completed.swap(0, Ordering::AcqRel),
            self.failed.swap(0, Ordering::AcqRel),
        )
    }
}

impl RunnerController for CountingController {
    fn on_runnable_complete(
        &self,
        _runnable: &dyn Runnable,
        _result: &Value,
        _progress: &paceline::ProgressSnapshot,
    ) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn on_runnable_error(
        &self,
        _runnable: &dyn Runnable,
        _error: &anyhow::Error,
        _progress: &paceline::ProgressSnapshot,
    ) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_demo(
    items: u64,
    runners: u32,
    target_seconds: u64,
    cost_ms: u64,
    fail_every: u64,
    alarm: bool,
    state_dir: Option<String>,
) -> anyhow::Result<()> {
    const TASK_ID: u64 = 1;

    let runner_ids: Vec<u32> = (1..=runners.max(1)).collect();
    let mut state = TaskInstanceState::new(
        TASK_ID,
        runner_ids.len(),
        runner_ids.clone(),
        "paceline-cli",
        0,
    )?;
    state.update_num_runnables(items as i64);
    state.mark_persisted();

    let task = SumTask {
        cost: Duration::from_millis(cost_ms),
        fail_every,
    };

    let store: Arc<dyn StateStore> = match &state_dir {
        Some(dir) => {
            let store = JsonFileStore::new(dir.as_str())
                .with_context(|| format!("cannot open state dir {}", dir))?;
            if !store.has_task(TASK_ID) {
                store.register_task(TASK_ID, &runner_ids, true)?;
            }
            Arc::new(store)
        }
        None => {
            let store = MemoryStore::new();
            store.register_task(TASK_ID, &runner_ids, true)?;
            Arc::new(store)
        }
    };

    let controller = Arc::new(CountingController::default());
    let config = PacingConfig::new()
        .with_target_seconds(target_seconds)
        .with_alarm_signal(alarm);
    let runner = Runner::new(
        Arc::clone(&controller) as Arc<dyn RunnerController>,
        Arc::new(SystemClock::new()),
        store,
    )
    .with_config(config);

    println!(
        "{} {} items across {} runner(s), {}s target per incarnation",
        "paceline:".bold(),
        items,
        runner_ids.len(),
        target_seconds
    );

    // Enough incarnations to finish even one runnable at a time.
    let max_incarnations = items + runner_ids.len() as u64 * 2 + 10;
    let mut incarnation = 0u64;
    'driver: loop {
        for &runner_id in &runner_ids {
            incarnation += 1;
            if incarnation > max_incarnations {
                bail!("demo did not converge after {} incarnations", incarnation);
            }
            let outcome = runner.run(&task, &state, runner_id)?;
            let (completed, failed) = controller.take();
            match outcome {
                RunOutcome::Complete(response) => {
                    println!(
                        "  incarnation {:>3} (runner {}): {} ok, {} failed",
                        incarnation, runner_id, completed, failed
                    );
                    println!(
                        "{} {} after {} incarnation(s)",
                        "done:".green().bold(),
                        response,
                        incarnation
                    );
                    break 'driver;
                }
                RunOutcome::Incomplete => {
                    println!(
                        "  incarnation {:>3} (runner {}): {} ok, {} failed",
                        incarnation, runner_id, completed, failed
                    );
                }
                RunOutcome::UnknownRunner => {
                    bail!("runner {} is not part of task {}", runner_id, TASK_ID);
                }
            }
        }
    }
    Ok(())
}

fn print_banner() {
    println!("{}", "Paceline".bold());
    println!("Self-pacing batch execution across short-lived incarnations");
    println!("v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Try: paceline run --items 10000 --target-seconds 2");
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Run {
            items,
            runners,
            target_seconds,
            cost_ms,
            fail_every,
            alarm,
            state_dir,
        }) => run_demo(
            items,
            runners,
            target_seconds,
            cost_ms,
            fail_every,
            alarm,
            state_dir,
        ),
        None => {
            print_banner();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
