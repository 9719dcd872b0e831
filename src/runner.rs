//! Runner execution loop
//!
//! Drives one incarnation: pulls Runnable ids from the striped iterator,
//! executes each, feeds the pacing engine, forwards results to the
//! aggregator and the Task/controller hooks, and stops when either the
//! pacing budget or the host says so. On exit it either assembles the
//! Task's final response (when every runner's partition is exhausted) or
//! checkpoints a resume point for the next incarnation.
//!
//! One Runnable's failure never stops the loop; only the continue
//! decision does.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::aggregator::ResultAggregator;
use crate::clock::Clock;
use crate::controller::RunnerController;
use crate::error::PacelineError;
use crate::event_log::{EventKind, EventLog};
use crate::pacing::{PacingConfig, PacingEngine};
use crate::state::TaskInstanceState;
use crate::store::{RunnerCheckpoint, StateStore};
use crate::task::{StripedIds, Task};

/// What one incarnation produced
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The whole Task finished; carries the assembled response.
    Complete(Value),
    /// Budget exhausted or host abort; caller must schedule a follow-up
    /// incarnation (resume state has been persisted).
    Incomplete,
    /// The runner id is not part of the Task's runner set. Nothing was
    /// executed; observable on purpose instead of a silent no-op.
    UnknownRunner,
}

/// Executes one Runner incarnation against injected collaborator ports
pub struct Runner {
    controller: Arc<dyn RunnerController>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    config: PacingConfig,
    event_log: EventLog,
}

impl Runner {
    pub fn new(
        controller: Arc<dyn RunnerController>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            controller,
            clock,
            store,
            config: PacingConfig::default(),
            event_log: EventLog::new(),
        }
    }

    /// Override the pacing configuration
    pub fn with_config(mut self, config: PacingConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing event log
    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Run one incarnation of `runner_id` against `task`.
    ///
    /// Returns `Complete` only when this incarnation exhausted its own
    /// partition AND every other runner had already reported done.
    #[instrument(skip(self, task, state), fields(task_id = state.task_id(), runner_id))]
    pub fn run(
        &self,
        task: &dyn Task,
        state: &TaskInstanceState,
        runner_id: u32,
    ) -> Result<RunOutcome, PacelineError> {
        let task_id = state.task_id();

        let Some(rank) = state.rank_of(runner_id) else {
            warn!("runner id not in the task's runner set; nothing to do");
            self.event_log
                .emit(EventKind::UnknownRunner { task_id, runner_id });
            return Ok(RunOutcome::UnknownRunner);
        };

        let runner_state = self.store.load_runner_state(task_id, runner_id)?;
        self.event_log.emit(EventKind::IncarnationStarted {
            task_id,
            runner_id,
            resume_after: runner_state.last_completed_runnable_id,
        });

        let mut aggregator = ResultAggregator::new();
        let mut pacing = PacingEngine::new(self.config.clone(), Arc::clone(&self.clock));
        let mut ids = StripedIds::new(
            rank,
            state.num_runners(),
            runner_state.last_completed_runnable_id,
            state.num_runnables(),
        );

        let mut last_completed = runner_state.last_completed_runnable_id;
        let mut stopped_early = false;

        let mut next_id = ids.next();
        while let Some(id) = next_id {
            let runnable = task.runnable(state, id);
            self.controller.before_runnable_started(&*runnable);

            match runnable.run() {
                Ok(result) => {
                    let progress = pacing.record_runnable();
                    task.on_runnable_complete(&*runnable, &result, &mut aggregator);
                    self.controller
                        .on_runnable_complete(&*runnable, &result, &progress);
                    self.event_log.emit(EventKind::RunnableCompleted {
                        task_id,
                        runner_id,
                        runnable_id: id,
                    });
                }
                Err(error) => {
                    // Failures consume the same pacing slot as successes.
                    let progress = pacing.record_runnable();
                    task.on_runnable_error(&*runnable, &error);
                    self.controller
                        .on_runnable_error(&*runnable, &error, &progress);
                    self.event_log.emit(EventKind::RunnableFailed {
                        task_id,
                        runner_id,
                        runnable_id: id,
                        error: format!("{:#}", error),
                    });
                }
            }
            // The Runnable finished (either way) before any stop check,
            // so it is the resume point even if we stop right now.
            last_completed = Some(id);

            let pacing_ok = pacing.should_continue();
            let host_ok = self.controller.should_continue_running();
            if pacing_ok && host_ok {
                next_id = ids.next();
            } else {
                stopped_early = true;
                if !host_ok {
                    self.event_log
                        .emit(EventKind::HostAbort { task_id, runner_id });
                } else if pacing.stopped_by_clock_regression() {
                    self.event_log
                        .emit(EventKind::ClockRegressionStop { task_id, runner_id });
                } else {
                    self.event_log.emit(EventKind::BudgetExhausted {
                        task_id,
                        runner_id,
                        runnables_executed: pacing.runnables_executed(),
                    });
                }
                break;
            }
        }
        pacing.shutdown();

        let partition_exhausted = !stopped_early;
        let others_done = runner_state
            .incomplete_runner_ids
            .iter()
            .all(|&id| id == runner_id);
        let task_complete = partition_exhausted && others_done;

        debug!(
            executed = pacing.runnables_executed(),
            partition_exhausted, task_complete, "incarnation loop finished"
        );

        let contribution = self.combine_results(
            task,
            task_id,
            &aggregator,
            runner_state.partial_result.clone(),
            task_complete,
        )?;

        if task_complete {
            let final_results = self.final_results(task, task_id, contribution)?;
            let response = task.assemble_response(final_results);
            self.store.save_task_finalization(task_id)?;
            self.controller.on_task_complete();
            self.event_log.emit(EventKind::TaskCompleted {
                task_id,
                runner_id,
                response: response.clone(),
            });
            Ok(RunOutcome::Complete(response))
        } else {
            let checkpoint = RunnerCheckpoint {
                last_completed_runnable_id: last_completed,
                contribution,
                done: partition_exhausted,
            };
            self.store.save_runner_state(task_id, runner_id, &checkpoint)?;
            self.event_log.emit(EventKind::IncarnationCheckpointed {
                task_id,
                runner_id,
                last_completed: checkpoint.last_completed_runnable_id,
                runner_done: checkpoint.done,
            });
            Ok(RunOutcome::Incomplete)
        }
    }

    /// Reduce/combine this incarnation's collected results into its
    /// contribution, folding across runners when completing a unary task.
    fn combine_results(
        &self,
        task: &dyn Task,
        task_id: u64,
        aggregator: &ResultAggregator,
        prior_partial: Option<Value>,
        task_complete: bool,
    ) -> Result<Option<Value>, PacelineError> {
        if aggregator.is_empty() {
            return Ok(None);
        }
        let combined = match task.reduce(aggregator) {
            Some(reduction) => {
                if task.supports_unary_partial_result() {
                    if task_complete {
                        // Fold every runner's last partial, then this
                        // incarnation's reduction on top.
                        let partials = self.store.load_all_results(task_id)?;
                        let folded = fold_partials(task, partials);
                        task.update_partial_result(reduction, folded)
                    } else {
                        task.update_partial_result(reduction, prior_partial)
                    }
                } else {
                    reduction
                }
            }
            // No reduction: the raw result set is the contribution.
            None => {
                let map: serde_json::Map<String, Value> = aggregator
                    .results()
                    .iter()
                    .map(|(id, v)| (id.to_string(), v.clone()))
                    .collect();
                Value::Object(map)
            }
        };
        Ok(Some(combined))
    }

    /// Assemble the cross-runner final result for a completing task.
    fn final_results(
        &self,
        task: &dyn Task,
        task_id: u64,
        contribution: Option<Value>,
    ) -> Result<Value, PacelineError> {
        if task.supports_unary_partial_result() {
            // `combine_results` already folded stored partials into the
            // contribution when something ran this incarnation.
            match contribution {
                Some(v) => Ok(v),
                None => {
                    let partials = self.store.load_all_results(task_id)?;
                    Ok(fold_partials(task, partials).unwrap_or(Value::Null))
                }
            }
        } else {
            let mut all = self.store.load_all_results(task_id)?;
            if let Some(v) = contribution {
                all.push(v);
            }
            Ok(Value::Array(all))
        }
    }
}

/// Fold a list of unary partials into one value, first element first.
/// The Task's combine op is expected to be associative/commutative, so
/// the fold order carries no meaning; ascending runner id keeps it
/// deterministic.
fn fold_partials(task: &dyn Task, partials: Vec<Value>) -> Option<Value> {
    let mut current: Option<Value> = None;
    for partial in partials {
        current = Some(match current {
            None => partial,
            Some(acc) => task.update_partial_result(partial, Some(acc)),
        });
    }
    current
}
