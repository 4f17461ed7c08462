//! The value a step returns.

use super::{Fault, FaultError, PipelineState, StepDescriptor};

/// What a step hands back to the runner.
///
/// `Ok` must wrap a `State` or a `Descriptor`; any other nesting is a
/// contract violation and aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A replacement state (implicit success).
    State(PipelineState),
    /// A replacement descriptor for the running step; the state is unchanged.
    Descriptor(StepDescriptor),
    /// An explicit success tag.
    Ok(Box<Outcome>),
    /// An explicit failure wrapping an error value.
    Error(FaultError),
    /// An explicit failure carrying a complete fault record.
    Fault(Fault),
}

impl Outcome {
    /// Wraps a state in an explicit success tag.
    #[must_use]
    pub fn ok(state: PipelineState) -> Self {
        Self::Ok(Box::new(Self::State(state)))
    }

    /// Creates an explicit failure.
    #[must_use]
    pub fn fail(error: FaultError) -> Self {
        Self::Error(error)
    }

    /// Creates an explicit failure with a reason tag.
    #[must_use]
    pub fn fail_with(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(FaultError::tagged(reason, message))
    }

    /// Returns true if this outcome reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Fault(_))
    }
}

impl From<PipelineState> for Outcome {
    fn from(state: PipelineState) -> Self {
        Self::State(state)
    }
}

impl From<StepDescriptor> for Outcome {
    fn from(step: StepDescriptor) -> Self {
        Self::Descriptor(step)
    }
}

impl From<Fault> for Outcome {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let ok = Outcome::ok(PipelineState::new());
        assert!(matches!(ok, Outcome::Ok(ref inner) if matches!(**inner, Outcome::State(_))));
        assert!(!ok.is_failure());

        let failed = Outcome::fail_with("invalid", "bad input");
        assert!(failed.is_failure());
        assert_eq!(
            failed,
            Outcome::Error(FaultError::tagged("invalid", "bad input"))
        );
    }

    #[test]
    fn test_from_conversions() {
        assert!(matches!(Outcome::from(PipelineState::new()), Outcome::State(_)));
        assert!(matches!(
            Outcome::from(StepDescriptor::new("a")),
            Outcome::Descriptor(_)
        ));
        assert!(Outcome::from(Fault::signalled(FaultError::new("x"))).is_failure());
    }
}
