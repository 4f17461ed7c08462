//! Error types for the stepline engine.
//!
//! Two families live here. [`EngineError`] is the fatal taxonomy: malformed
//! specifications, missing entry points, malformed step output, join timeouts
//! and escalated faults. These always abort the run. [`StepError`] is the
//! channel a step uses to report a thrown or abrupt failure; the runner turns
//! it into a recorded fault unless it is a supervisor-directed exit.

use crate::core::Fault;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The fatal error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipeline specification is malformed.
    #[error("{0}")]
    Spec(#[from] SpecError),

    /// No pipeline is configured under the given owner and name.
    #[error("No pipeline named '{name}' is configured for '{owner}'")]
    PipelineNotFound {
        /// The owner identifier.
        owner: String,
        /// The pipeline name.
        name: String,
    },

    /// A unit resolved, but has no runnable entry point.
    #[error("Unit '{unit}' is declared but has no runnable entry point")]
    MissingEntryPoint {
        /// The unit name.
        unit: String,
    },

    /// A step returned an outcome outside its contract.
    #[error("Invalid outcome from step '{unit}': {reason}")]
    MalformedOutcome {
        /// The unit name.
        unit: String,
        /// What was wrong with the outcome.
        reason: String,
    },

    /// A parallel group did not finish within the join timeout.
    #[error("Parallel group of {branches} branch(es) did not complete within {timeout_ms}ms")]
    JoinTimeout {
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
        /// Number of branches in the group.
        branches: usize,
    },

    /// A fault raised immediately because the run is in crash mode.
    #[error("{}", .0.render(crate::core::Verbosity::Normal))]
    Escalated(Box<Fault>),

    /// A step exited on supervisor request.
    #[error("Step '{unit}' exited: {reason}")]
    Exited {
        /// The unit name.
        unit: String,
        /// The exit reason.
        reason: ExitReason,
    },

    /// A parallel branch task could not be joined.
    #[error("Parallel branch failed to join: {0}")]
    BranchJoin(String),

    /// A nested run was requested outside of an active run.
    #[error("No pipeline run is active on this task")]
    NoActiveRun,

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a malformed outcome error.
    #[must_use]
    pub fn malformed(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOutcome {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    /// Returns the escalated fault, if this error carries one.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Escalated(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Error raised when a pipeline specification cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid pipeline specification at {}: {message}", render_path(.path))]
pub struct SpecError {
    /// The error message.
    pub message: String,
    /// Index path of the offending element, outermost first.
    pub path: Vec<usize>,
}

impl SpecError {
    /// Creates a new specification error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Sets the element path.
    #[must_use]
    pub fn at(mut self, path: &[usize]) -> Self {
        self.path = path.to_vec();
        self
    }
}

fn render_path(path: &[usize]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter().map(|i| format!("[{i}]")).collect()
}

/// Why a step terminated abruptly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Orderly shutdown requested by a supervisor.
    Shutdown,
    /// Forced termination by a supervisor.
    Killed,
    /// Any other abrupt termination.
    Abnormal(String),
}

impl ExitReason {
    /// Returns true if the exit came from supervisor intervention.
    ///
    /// Such exits propagate out of the run instead of becoming faults.
    #[must_use]
    pub fn is_supervisor_directed(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Killed)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown"),
            Self::Killed => write!(f, "killed"),
            Self::Abnormal(reason) => write!(f, "{reason}"),
        }
    }
}

/// The error channel of a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The step's own logic failed.
    #[error(transparent)]
    Thrown(#[from] anyhow::Error),

    /// The step terminated abruptly.
    #[error("exit: {0}")]
    Exit(ExitReason),

    /// A fatal error from a nested run that must abort the outer run.
    #[error(transparent)]
    Fatal(Box<EngineError>),
}

impl StepError {
    /// Creates a thrown error from a message.
    #[must_use]
    pub fn thrown(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Thrown(anyhow::Error::msg(message))
    }
}

impl From<EngineError> for StepError {
    fn from(err: EngineError) -> Self {
        Self::Fatal(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_error_path_rendering() {
        let err = SpecError::new("expected a step").at(&[2, 1]);
        assert_eq!(
            err.to_string(),
            "Invalid pipeline specification at [2][1]: expected a step"
        );

        let root = SpecError::new("not a list");
        assert!(root.to_string().contains("<root>"));
    }

    #[test]
    fn test_exit_reason_classification() {
        assert!(ExitReason::Shutdown.is_supervisor_directed());
        assert!(ExitReason::Killed.is_supervisor_directed());
        assert!(!ExitReason::Abnormal("boom".into()).is_supervisor_directed());
        assert_eq!(ExitReason::Abnormal("boom".into()).to_string(), "boom");
    }

    #[test]
    fn test_engine_error_from_spec_error() {
        let err: EngineError = SpecError::new("bad").into();
        assert!(matches!(err, EngineError::Spec(_)));
        assert!(err.fault().is_none());
    }

    #[test]
    fn test_step_error_conversions() {
        let thrown: StepError = anyhow::anyhow!("db down").into();
        assert_eq!(thrown.to_string(), "db down");

        let fatal: StepError = EngineError::NoActiveRun.into();
        assert!(matches!(fatal, StepError::Fatal(_)));

        let exit = StepError::Exit(ExitReason::Shutdown);
        assert_eq!(exit.to_string(), "exit: shutdown");
    }

    #[test]
    fn test_malformed_helper() {
        let err = EngineError::malformed("persist", "nested success tag");
        assert_eq!(
            err.to_string(),
            "Invalid outcome from step 'persist': nested success tag"
        );
    }
}
