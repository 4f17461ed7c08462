//! Pipeline state: executed steps, pending steps, faults and shared context.

use super::{Fault, StepDescriptor, Verbosity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Write as _;

/// Shared key-value context visible to every step.
pub type Context = serde_json::Map<String, Value>;

/// An element of the pending-steps tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingEntry {
    /// A step run in sequence.
    Step(StepDescriptor),
    /// A group of entries run concurrently and joined before continuing.
    Parallel(Vec<PendingEntry>),
}

impl PendingEntry {
    /// Returns the number of steps in this entry, counting nested groups.
    #[must_use]
    pub fn step_count(&self) -> usize {
        match self {
            Self::Step(_) => 1,
            Self::Parallel(group) => group.iter().map(Self::step_count).sum(),
        }
    }

    /// Returns true if this entry is a step for the given unit.
    #[must_use]
    pub fn is_unit(&self, unit: &str) -> bool {
        matches!(self, Self::Step(step) if step.unit() == unit)
    }
}

impl From<StepDescriptor> for PendingEntry {
    fn from(step: StepDescriptor) -> Self {
        Self::Step(step)
    }
}

/// Per-invocation toggles visible to steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunFlags {
    /// Raise faults immediately instead of recording them.
    #[serde(default)]
    pub crash: bool,
    /// Emit diagnostics.
    #[serde(default)]
    pub debug: bool,
    /// Emit detailed diagnostics.
    #[serde(default)]
    pub verbose: bool,
}

impl RunFlags {
    /// Returns the report verbosity matching these flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// The state threaded through a pipeline run.
///
/// Updated by replacement: each step receives the state and returns the next
/// one. `done` is kept in execution order and `faults` only grows during a
/// run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineState {
    /// Steps that ran successfully, in execution order.
    #[serde(default)]
    pub done: Vec<StepDescriptor>,
    /// Steps still to run, consumed left to right.
    #[serde(default)]
    pub pending: VecDeque<PendingEntry>,
    /// Recorded faults.
    #[serde(default)]
    pub faults: Vec<Fault>,
    /// Shared context.
    #[serde(default)]
    pub context: Context,
    /// Toggles for the current run.
    #[serde(default)]
    pub flags: RunFlags,
}

impl PipelineState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state from a pending-steps tree.
    #[must_use]
    pub fn with_pending(pending: impl IntoIterator<Item = PendingEntry>) -> Self {
        Self {
            pending: pending.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Creates a state running the given steps in sequence.
    #[must_use]
    pub fn with_steps(steps: impl IntoIterator<Item = StepDescriptor>) -> Self {
        Self::with_pending(steps.into_iter().map(PendingEntry::Step))
    }

    /// Replaces the context.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Sets a context value, returning the updated state.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Sets a context value in place.
    pub fn assign(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    /// Returns a context value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Returns a context value as an integer.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.context.get(key).and_then(Value::as_i64)
    }

    /// Appends a fault, returning the updated state.
    #[must_use]
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Returns true if any fault has been recorded.
    #[must_use]
    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Returns the units of the executed steps, in execution order.
    #[must_use]
    pub fn done_units(&self) -> Vec<&str> {
        self.done.iter().map(StepDescriptor::unit).collect()
    }

    /// Returns the number of steps still pending, counting nested groups.
    #[must_use]
    pub fn pending_steps(&self) -> usize {
        self.pending.iter().map(PendingEntry::step_count).sum()
    }

    /// Splices out the pending entries before the first `closing_unit` step.
    ///
    /// The closing step itself is dropped. When no closing step is pending,
    /// everything pending is taken.
    pub fn split_until(&mut self, closing_unit: &str) -> Vec<PendingEntry> {
        match self.pending.iter().position(|e| e.is_unit(closing_unit)) {
            Some(at) => {
                let rest = self.pending.split_off(at + 1);
                let mut taken: Vec<_> = std::mem::replace(&mut self.pending, rest).into();
                taken.pop();
                taken
            }
            None => std::mem::take(&mut self.pending).into(),
        }
    }

    /// Renders every fault as a multi-line report.
    #[must_use]
    pub fn render_faults(&self, verbosity: Verbosity) -> String {
        let mut out = format!("{} fault(s) occurred:", self.faults.len());
        for (i, fault) in self.faults.iter().enumerate() {
            let rendered = fault.render(verbosity);
            let mut lines = rendered.lines();
            if let Some(first) = lines.next() {
                let _ = write!(out, "\n{}) {first}", i + 1);
            }
            for line in lines {
                let _ = write!(out, "\n   {line}");
            }
        }
        out
    }
}
