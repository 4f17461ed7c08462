//! The scheduler: walks the pending-steps tree and threads state through it.
//!
//! Sequential entries run one after another on the calling task. A parallel
//! group forks one task per entry, each with a private copy of the state, and
//! joins them (bounded by the join timeout) before the merged state moves on.

use super::merge::merge_states;
use crate::core::{Fault, FaultError, Outcome, PendingEntry, PipelineState, RunFlags, StepDescriptor};
use crate::diagnostics::{self, DiagnosticsSink, TracingSink};
use crate::errors::{EngineError, StepError};
use crate::steps::{Resolution, StepRegistry};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Default bound on waiting for a parallel group.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(5000);

tokio::task_local! {
    static CURRENT_RUNNER: Runner;
}

/// Executes pipeline states against a step registry.
///
/// Cheap to clone; every parallel branch carries its own handle.
#[derive(Debug, Clone)]
pub struct Runner {
    registry: Arc<StepRegistry>,
    flags: RunFlags,
    join_timeout: Duration,
    disabled: Arc<HashSet<String>>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Runner {
    /// Creates a runner with default settings.
    #[must_use]
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            flags: RunFlags::default(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            disabled: Arc::new(HashSet::new()),
            sink: Arc::new(TracingSink),
        }
    }

    /// Sets all run flags.
    #[must_use]
    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Raises faults immediately instead of recording them.
    #[must_use]
    pub fn with_crash(mut self, crash: bool) -> Self {
        self.flags.crash = crash;
        self
    }

    /// Sets the parallel-group join timeout.
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Disables units for runs of this runner.
    #[must_use]
    pub fn with_disabled(mut self, units: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disabled = Arc::new(units.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the diagnostics sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the run flags.
    #[must_use]
    pub fn flags(&self) -> RunFlags {
        self.flags
    }

    /// Returns the join timeout.
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        self.join_timeout
    }

    /// Runs every pending step of `state`.
    ///
    /// Faults are recorded in the returned state; only fatal conditions (and
    /// any fault, in crash mode) come back as errors.
    pub async fn run(&self, mut state: PipelineState) -> Result<PipelineState, EngineError> {
        state.flags = self.flags;
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id);
        let started = Instant::now();

        info!(parent: &span, steps = state.pending_steps(), "Pipeline run started");
        let result = self
            .scoped(self.run_pending(state))
            .instrument(span.clone())
            .await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(finished) => info!(
                parent: &span,
                done = finished.done.len(),
                faults = finished.faults.len(),
                duration_ms,
                "Pipeline run finished"
            ),
            Err(e) => error!(parent: &span, error = %e, duration_ms, "Pipeline run aborted"),
        }
        result
    }

    fn scoped<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        CURRENT_RUNNER.scope(self.clone(), diagnostics::scope(Arc::clone(&self.sink), fut))
    }

    fn run_pending(&self, mut state: PipelineState) -> BoxFuture<'static, Result<PipelineState, EngineError>> {
        let runner = self.clone();
        async move {
            while let Some(entry) = state.pending.pop_front() {
                state = match entry {
                    PendingEntry::Step(step) => runner.run_step(state, step).await?,
                    PendingEntry::Parallel(group) => runner.run_group(state, group).await?,
                };
            }
            Ok(state)
        }
        .boxed()
    }

    async fn run_step(
        &self,
        state: PipelineState,
        step: StepDescriptor,
    ) -> Result<PipelineState, EngineError> {
        let unit = match self.registry.resolve(step.unit(), &self.disabled) {
            Resolution::Run(unit) => unit,
            Resolution::Skip(reason) => {
                debug!(unit = %step.unit(), %reason, "Skipping step");
                self.emit(&step, "step.skipped", || json!({"unit": step.unit(), "reason": reason.to_string()}));
                return Ok(state);
            }
            Resolution::MissingEntryPoint => {
                return Err(EngineError::MissingEntryPoint {
                    unit: step.unit().to_string(),
                })
            }
        };

        debug!(unit = %step.unit(), "Running step");
        self.emit(&step, "step.started", || json!({"unit": step.unit(), "context": state.context}));
        let started = Instant::now();

        let result = AssertUnwindSafe(unit.run(state.clone(), &step))
            .catch_unwind()
            .await;

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(unit = %step.unit(), duration_ms, "Step returned");

        match result {
            Ok(Ok(outcome)) => self.apply_outcome(state, step, outcome),
            Ok(Err(StepError::Thrown(err))) => {
                let fault = Fault::from_anyhow(&err);
                self.record(state, step, fault)
            }
            Ok(Err(StepError::Exit(reason))) => {
                if reason.is_supervisor_directed() {
                    warn!(unit = %step.unit(), %reason, "Step exited on supervisor request");
                    return Err(EngineError::Exited {
                        unit: step.unit().to_string(),
                        reason,
                    });
                }
                let fault = Fault::exited(FaultError::new(reason.to_string()));
                self.record(state, step, fault)
            }
            Ok(Err(StepError::Fatal(err))) => Err(*err),
            Err(panic) => {
                let fault = Fault::thrown(FaultError::tagged("panic", panic_message(panic.as_ref())));
                self.record(state, step, fault)
            }
        }
    }

    fn apply_outcome(
        &self,
        before: PipelineState,
        step: StepDescriptor,
        outcome: Outcome,
    ) -> Result<PipelineState, EngineError> {
        match outcome {
            Outcome::State(next) => self.advance(&before, step, next),
            Outcome::Descriptor(updated) => self.rewrite(before, &step, updated),
            Outcome::Ok(inner) => match *inner {
                Outcome::State(next) => self.advance(&before, step, next),
                Outcome::Descriptor(updated) => self.rewrite(before, &step, updated),
                other => Err(EngineError::malformed(
                    step.unit(),
                    format!(
                        "success tag must wrap a state or a descriptor, got {}",
                        describe(&other)
                    ),
                )),
            },
            Outcome::Error(error) => self.record(before, step, Fault::signalled(error)),
            Outcome::Fault(fault) => self.record(before, step, fault),
        }
    }

    fn advance(
        &self,
        before: &PipelineState,
        step: StepDescriptor,
        mut next: PipelineState,
    ) -> Result<PipelineState, EngineError> {
        if next.faults.len() < before.faults.len() {
            return Err(EngineError::malformed(
                step.unit(),
                format!(
                    "returned state dropped recorded faults ({} -> {})",
                    before.faults.len(),
                    next.faults.len()
                ),
            ));
        }
        self.emit(&step, "step.completed", || json!({"unit": step.unit(), "context": next.context}));
        next.done.push(step);
        Ok(next)
    }

    fn rewrite(
        &self,
        mut state: PipelineState,
        step: &StepDescriptor,
        updated: StepDescriptor,
    ) -> Result<PipelineState, EngineError> {
        if !updated.same_entity(step) {
            return Err(EngineError::malformed(
                step.unit(),
                format!("returned descriptor for '{}' belongs to a different step", updated.unit()),
            ));
        }
        self.emit(step, "step.rewritten", || json!({"unit": step.unit(), "meta": updated.meta()}));
        state.done.push(updated);
        Ok(state)
    }

    fn record(
        &self,
        mut state: PipelineState,
        step: StepDescriptor,
        fault: Fault,
    ) -> Result<PipelineState, EngineError> {
        let fault = match fault.snapshot() {
            Some(_) => fault,
            None => fault.with_snapshot(state.clone()),
        };
        let fault = match fault.origin_step() {
            Some(_) => fault,
            None => fault.with_step(step),
        };

        if self.flags.crash {
            error!(fault = %fault, "Step failed in crash mode");
            return Err(EngineError::Escalated(Box::new(fault)));
        }

        warn!(
            kind = %fault.origin_kind(),
            error = %fault.error(),
            unit = fault.origin_step().map_or("", StepDescriptor::unit),
            "Step failed; fault recorded"
        );
        if let Some(origin) = fault.origin_step() {
            self.emit(origin, "step.failed", || json!({"fault": fault.render(self.flags.verbosity())}));
        }
        state.faults.push(fault);
        Ok(state)
    }

    async fn run_group(
        &self,
        mut state: PipelineState,
        group: Vec<PendingEntry>,
    ) -> Result<PipelineState, EngineError> {
        let rest = std::mem::take(&mut state.pending);
        let branches = group.len();
        debug!(branches, "Forking parallel group");

        let handles: Vec<_> = group
            .into_iter()
            .map(|entry| {
                let mut branch = state.clone();
                branch.pending = VecDeque::from([entry]);
                tokio::spawn(
                    self.scoped(self.run_pending(branch))
                        .instrument(Span::current()),
                )
            })
            .collect();

        // Branches still running after a timeout are detached, not cancelled.
        let joined = tokio::time::timeout(self.join_timeout, join_all(handles))
            .await
            .map_err(|_| {
                let timeout_ms = u64::try_from(self.join_timeout.as_millis()).unwrap_or(u64::MAX);
                error!(branches, timeout_ms, "Parallel group timed out");
                EngineError::JoinTimeout { timeout_ms, branches }
            })?;

        let mut merged: Option<PipelineState> = None;
        for result in joined {
            let branch = result.map_err(|e| EngineError::BranchJoin(e.to_string()))??;
            merged = Some(match merged {
                Some(acc) => merge_states(&state, acc, branch),
                None => branch,
            });
        }

        let mut merged = merged.unwrap_or(state);
        merged.pending = rest;
        debug!(branches, faults = merged.faults.len(), "Joined parallel group");
        Ok(merged)
    }

    fn emit(&self, step: &StepDescriptor, label: &str, payload: impl FnOnce() -> Value) {
        if diagnostics::should_emit(&self.flags, step.options()) {
            self.sink.maybe_emit(&self.flags, step.options(), &payload(), label);
        }
    }
}

/// Runs the pending steps of `state` with the runner of the current run.
///
/// Lets a step splice out the steps that follow it and run them itself, for
/// example inside a transaction.
///
/// # Errors
///
/// Returns [`EngineError::NoActiveRun`] when called outside a run, and any
/// fatal error raised by the nested steps.
pub async fn run_nested(state: PipelineState) -> Result<PipelineState, EngineError> {
    let runner = CURRENT_RUNNER
        .try_with(Runner::clone)
        .map_err(|_| EngineError::NoActiveRun)?;
    runner.run_pending(state).await
}

fn describe(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::State(_) => "a state",
        Outcome::Descriptor(_) => "a descriptor",
        Outcome::Ok(_) => "a nested success tag",
        Outcome::Error(_) => "an error",
        Outcome::Fault(_) => "a fault",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}
