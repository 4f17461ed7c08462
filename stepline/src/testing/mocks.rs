//! Mock steps for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use crate::core::{Context, FaultError, Outcome, PipelineState, StepDescriptor};
use crate::errors::{ExitReason, StepError};
use crate::steps::Step;

/// A step that sets one context key.
#[derive(Debug)]
pub struct SetKeyStep {
    name: String,
    key: String,
    value: Value,
}

impl SetKeyStep {
    /// Creates a step writing `value` under `key`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            value,
        }
    }
}

#[async_trait]
impl Step for SetKeyStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        state.assign(self.key.clone(), self.value.clone());
        Ok(Outcome::State(state))
    }
}

/// A step that signals failure through its outcome.
#[derive(Debug)]
pub struct FailingStep {
    name: String,
    error: FaultError,
}

impl FailingStep {
    /// Creates a failing step with an untagged message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: FaultError::new(message),
        }
    }

    /// Creates a failing step with a reason tag.
    #[must_use]
    pub fn tagged(name: impl Into<String>, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: FaultError::tagged(reason, message),
        }
    }
}

#[async_trait]
impl Step for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        Ok(Outcome::Error(self.error.clone()))
    }
}

/// A step that returns an error from its own logic.
#[derive(Debug)]
pub struct ThrowingStep {
    name: String,
    message: String,
}

impl ThrowingStep {
    /// Creates a throwing step.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Step for ThrowingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        Err(anyhow::anyhow!("{}", self.message)
            .context(format!("{} failed", self.name))
            .into())
    }
}

/// A step that terminates abruptly.
#[derive(Debug)]
pub struct ExitingStep {
    name: String,
    reason: ExitReason,
}

impl ExitingStep {
    /// Creates an exiting step.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: ExitReason) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }
}

#[async_trait]
impl Step for ExitingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        Err(StepError::Exit(self.reason.clone()))
    }
}

/// A step that panics.
#[derive(Debug)]
pub struct PanickingStep {
    name: String,
    message: String,
}

impl PanickingStep {
    /// Creates a panicking step.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Step for PanickingStep {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    async fn run(&self, _state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        panic!("{}", self.message)
    }
}

/// A step that takes time to execute, then marks itself in the context.
#[derive(Debug)]
pub struct SlowStep {
    name: String,
    delay: Duration,
}

impl SlowStep {
    /// Creates a new slow step.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    /// Creates a slow step with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }
}

#[async_trait]
impl Step for SlowStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        tokio::time::sleep(self.delay).await;
        state.assign(self.name.clone(), Value::Bool(true));
        Ok(Outcome::State(state))
    }
}

/// What a [`RecordingStep`] saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The descriptor it was called with.
    pub step: StepDescriptor,
    /// The context it received.
    pub context: Context,
    /// Units already done when it ran.
    pub done: Vec<String>,
    /// Faults already recorded when it ran.
    pub faults: usize,
}

/// A step that records every call and passes the state through.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingStep {
    /// Creates a new recording step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the step was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the last recorded call.
    #[must_use]
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().last().cloned()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, step: &StepDescriptor) -> Result<Outcome, StepError> {
        self.calls.lock().push(RecordedCall {
            step: step.clone(),
            context: state.context.clone(),
            done: state.done_units().into_iter().map(str::to_string).collect(),
            faults: state.faults.len(),
        });
        Ok(Outcome::State(state))
    }
}

/// The ways a [`MalformedStep`] breaks the step contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    /// A success tag wrapping an error.
    NestedTag,
    /// A state with fewer faults than it was given.
    DroppedFaults,
    /// A descriptor that belongs to another step.
    ForeignDescriptor,
}

/// A step that returns an outcome the engine must reject.
#[derive(Debug)]
pub struct MalformedStep {
    name: String,
    kind: Malformation,
}

impl MalformedStep {
    /// Creates a malformed step.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: Malformation) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[async_trait]
impl Step for MalformedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        Ok(match self.kind {
            Malformation::NestedTag => Outcome::Ok(Box::new(Outcome::fail(FaultError::new("wrapped")))),
            Malformation::DroppedFaults => {
                state.faults.clear();
                Outcome::State(state)
            }
            Malformation::ForeignDescriptor => Outcome::Descriptor(StepDescriptor::new(self.name.clone())),
        })
    }
}
