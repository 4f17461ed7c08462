//! Wrapping a run of sequential steps in an external transaction.
//!
//! A [`Transaction`] step splices the steps between itself and a closing
//! marker out of the pending list, runs them as a nested run, and then either
//! commits or rolls back through a [`TransactionHook`]. The engine does not
//! know it is inside a transaction.
//!
//! ```text
//! ["load", "transaction", "debit", "credit", "commit", "notify"]
//! ```
//!
//! Here `debit` and `credit` run inside the transaction; the `commit` marker is
//! consumed and `notify` runs afterwards as usual.

use super::Step;
use crate::core::{Fault, Outcome, PendingEntry, PipelineState, StepDescriptor};
use crate::errors::StepError;
use crate::pipeline;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default unit name closing a transaction.
pub const DEFAULT_CLOSING_UNIT: &str = "commit";

/// The persistence collaborator driven by a [`Transaction`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionHook: Send + Sync {
    /// Opens a transaction before the wrapped steps run.
    async fn begin(&self, state: &PipelineState) -> anyhow::Result<()>;

    /// Commits after the wrapped steps ran without adding faults.
    async fn commit(&self, state: &PipelineState) -> anyhow::Result<()>;

    /// Rolls back after the wrapped steps added faults or aborted, or after a
    /// failed commit.
    async fn rollback(&self, state: &PipelineState) -> anyhow::Result<()>;
}

/// A step running the following steps inside a transaction.
///
/// The closing marker defaults to [`DEFAULT_CLOSING_UNIT`] and can be
/// overridden per step with the `until` option. On rollback the returned
/// state is the state from before the transaction plus the new faults. A
/// failing hook is recorded as a thrown fault of this step; the wrapped steps
/// never run outside the transaction.
pub struct Transaction {
    name: String,
    closing_unit: String,
    hook: Arc<dyn TransactionHook>,
}

impl Transaction {
    /// Creates a transaction step.
    #[must_use]
    pub fn new(name: impl Into<String>, hook: Arc<dyn TransactionHook>) -> Self {
        Self {
            name: name.into(),
            closing_unit: DEFAULT_CLOSING_UNIT.to_string(),
            hook,
        }
    }

    /// Sets the default closing marker.
    #[must_use]
    pub fn closing_unit(mut self, unit: impl Into<String>) -> Self {
        self.closing_unit = unit.into();
        self
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.name)
            .field("closing_unit", &self.closing_unit)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    /// Records a hook failure and resumes after the closing marker.
    ///
    /// In crash mode the error is thrown so the run aborts before anything
    /// else runs.
    fn hook_failed(
        mut state: PipelineState,
        step: &StepDescriptor,
        rest: VecDeque<PendingEntry>,
        err: anyhow::Error,
    ) -> Result<Outcome, StepError> {
        if state.flags.crash {
            return Err(StepError::Thrown(err));
        }
        let fault = Fault::from_anyhow(&err)
            .with_step(step.clone())
            .with_snapshot(state.clone());
        state.faults.push(fault);
        state.pending = rest;
        Ok(Outcome::State(state))
    }
}

#[async_trait]
impl Step for Transaction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: PipelineState, step: &StepDescriptor) -> Result<Outcome, StepError> {
        let closing = step
            .option("until")
            .and_then(Value::as_str)
            .unwrap_or(&self.closing_unit)
            .to_string();

        let wrapped = state.split_until(&closing);
        let rest = std::mem::take(&mut state.pending);
        debug!(steps = wrapped.len(), closing = %closing, "Opening transaction");

        if let Err(err) = self.hook.begin(&state).await {
            warn!(error = %err, "Transaction failed to open; wrapped steps skipped");
            return Self::hook_failed(state, step, rest, err.context("transaction begin failed"));
        }

        let before = state.clone();
        state.pending = wrapped.into();
        let mut finished = match pipeline::run_nested(state).await {
            Ok(finished) => finished,
            Err(err) => {
                warn!(error = %err, "Transaction aborted; rolling back");
                if let Err(rollback_err) = self.hook.rollback(&before).await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(err.into());
            }
        };

        if finished.faults.len() > before.faults.len() {
            warn!(
                new_faults = finished.faults.len() - before.faults.len(),
                "Transaction rolled back"
            );
            let rolled_back = self.hook.rollback(&finished).await;
            let mut reverted = before;
            reverted.faults = finished.faults;
            if let Err(err) = rolled_back {
                warn!(error = %err, "Rollback failed");
                return Self::hook_failed(reverted, step, rest, err.context("transaction rollback failed"));
            }
            reverted.pending = rest;
            return Ok(Outcome::State(reverted));
        }

        if let Err(err) = self.hook.commit(&finished).await {
            warn!(error = %err, "Commit failed; rolling back");
            if let Err(rollback_err) = self.hook.rollback(&finished).await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            let mut reverted = before;
            reverted.faults = finished.faults;
            return Self::hook_failed(reverted, step, rest, err.context("transaction commit failed"));
        }
        debug!(done = finished.done.len(), "Transaction committed");
        finished.pending = rest;
        Ok(Outcome::State(finished))
    }
}
