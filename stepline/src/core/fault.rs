//! Fault records and their rendering.

use super::{PipelineState, StepDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Write as _};
use uuid::Uuid;

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// The step reported the failure itself.
    Signalled,
    /// The step's logic raised an error or panicked.
    Thrown,
    /// The step terminated abruptly.
    Exited,
}

impl OriginKind {
    /// Returns the label used in rendered reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Signalled => "error",
            Self::Exited => "exit",
            // Panics are recorded as thrown and share its label.
            Self::Thrown => "throw",
        }
    }
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signalled => write!(f, "signalled"),
            Self::Thrown => write!(f, "thrown"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// How much detail a rendered report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Classification, step and message.
    #[default]
    Normal,
    /// Adds the trace.
    Debug,
    /// Adds the trace, capture time, details and the context snapshot.
    Verbose,
}

/// The error payload carried by a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultError {
    /// Short machine-readable reason, e.g. `invalid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl FaultError {
    /// Creates an error with just a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            reason: None,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an error tagged with a reason.
    #[must_use]
    pub fn tagged(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(message).with_reason(reason)
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{reason}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<&anyhow::Error> for FaultError {
    fn from(err: &anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A recorded failure.
///
/// Created once per failure occurrence and never modified afterwards. It
/// carries enough to render a report without re-running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    id: Uuid,
    error: FaultError,
    origin_kind: OriginKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_step: Option<StepDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot: Option<Box<PipelineState>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    trace: Vec<String>,
    captured_at: DateTime<Utc>,
}

impl Fault {
    /// Creates a fault of the given kind.
    #[must_use]
    pub fn new(error: FaultError, origin_kind: OriginKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            error,
            origin_kind,
            origin_step: None,
            snapshot: None,
            trace: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Creates a fault for a failure the step reported itself.
    #[must_use]
    pub fn signalled(error: FaultError) -> Self {
        Self::new(error, OriginKind::Signalled)
    }

    /// Creates a fault for an error raised inside a step.
    #[must_use]
    pub fn thrown(error: FaultError) -> Self {
        Self::new(error, OriginKind::Thrown)
    }

    /// Creates a fault for an abrupt termination.
    #[must_use]
    pub fn exited(error: FaultError) -> Self {
        Self::new(error, OriginKind::Exited)
    }

    /// Creates a thrown fault from an `anyhow` error, using its cause chain as trace.
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::thrown(FaultError::from(err))
            .with_trace(err.chain().skip(1).map(ToString::to_string).collect())
    }

    /// Sets the step that produced the fault.
    #[must_use]
    pub fn with_step(mut self, step: StepDescriptor) -> Self {
        self.origin_step = Some(step);
        self
    }

    /// Sets the pipeline snapshot at failure time.
    ///
    /// The snapshot's own faults are dropped so records do not nest.
    #[must_use]
    pub fn with_snapshot(mut self, mut snapshot: PipelineState) -> Self {
        snapshot.faults.clear();
        self.snapshot = Some(Box::new(snapshot));
        self
    }

    /// Sets the trace.
    #[must_use]
    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    /// Returns the fault identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the error payload.
    #[must_use]
    pub fn error(&self) -> &FaultError {
        &self.error
    }

    /// Returns the origin kind.
    #[must_use]
    pub fn origin_kind(&self) -> OriginKind {
        self.origin_kind
    }

    /// Returns the step that produced the fault.
    #[must_use]
    pub fn origin_step(&self) -> Option<&StepDescriptor> {
        self.origin_step.as_ref()
    }

    /// Returns the pipeline snapshot at failure time.
    #[must_use]
    pub fn snapshot(&self) -> Option<&PipelineState> {
        self.snapshot.as_deref()
    }

    /// Returns the trace.
    #[must_use]
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Returns when the fault was captured.
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns true if the fault came from the given unit.
    #[must_use]
    pub fn is_from(&self, unit: &str) -> bool {
        self.origin_step.as_ref().is_some_and(|s| s.unit() == unit)
    }

    /// Renders a human-readable report.
    ///
    /// Pure: the same fault always renders to the same string.
    #[must_use]
    pub fn render(&self, verbosity: Verbosity) -> String {
        let mut out = match &self.origin_step {
            Some(step) => format!(
                "{} in step '{}': {}",
                self.origin_kind.label(),
                step,
                self.error
            ),
            None => format!("{}: {}", self.origin_kind.label(), self.error),
        };

        if verbosity >= Verbosity::Debug && !self.trace.is_empty() {
            out.push_str("\n  trace:");
            for (i, frame) in self.trace.iter().enumerate() {
                let _ = write!(out, "\n    {i}: {frame}");
            }
        }

        if verbosity >= Verbosity::Verbose {
            let _ = write!(out, "\n  captured at: {}", self.captured_at.to_rfc3339());
            if let Some(details) = &self.error.details {
                let _ = write!(out, "\n  details: {details}");
            }
            if let Some(snapshot) = &self.snapshot {
                let context = serde_json::to_string_pretty(&snapshot.context).unwrap_or_default();
                out.push_str("\n  context:");
                for line in context.lines() {
                    let _ = write!(out, "\n    {line}");
                }
            }
        }

        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Verbosity::Normal))
    }
}
