//! Test assertions for pipeline states.

use serde_json::Value;

use crate::core::{OriginKind, PipelineState};

/// Asserts that no fault was recorded.
pub fn assert_no_faults(state: &PipelineState) {
    assert!(
        state.faults.is_empty(),
        "Expected no faults, got:\n{}",
        state.render_faults(crate::core::Verbosity::Debug)
    );
}

/// Asserts the units of `done`, in execution order.
pub fn assert_done(state: &PipelineState, expected: &[&str]) {
    assert_eq!(state.done_units(), expected, "Unexpected done units");
}

/// Asserts that a context key holds the expected value.
pub fn assert_context_value(state: &PipelineState, key: &str, expected: &Value) {
    assert_eq!(
        state.get(key),
        Some(expected),
        "Context key '{key}' mismatch"
    );
}

/// Asserts that a context key is absent.
pub fn assert_context_missing(state: &PipelineState, key: &str) {
    assert!(
        state.get(key).is_none(),
        "Expected context key '{key}' to be absent"
    );
}

/// Asserts that exactly one fault was recorded for `unit`, with the given origin.
pub fn assert_fault_from(state: &PipelineState, unit: &str, kind: OriginKind) {
    let matching: Vec<_> = state.faults.iter().filter(|f| f.is_from(unit)).collect();
    assert_eq!(matching.len(), 1, "Expected one fault from '{unit}', got {}", matching.len());
    assert_eq!(matching[0].origin_kind(), kind, "Unexpected origin kind for '{unit}'");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fault, FaultError, StepDescriptor};
    use serde_json::json;

    fn sample() -> PipelineState {
        let mut state = PipelineState::new().with_value("x", json!(1));
        state.done.push(StepDescriptor::new("a"));
        state
    }

    #[test]
    fn test_assert_no_faults() {
        assert_no_faults(&sample());
    }

    #[test]
    #[should_panic(expected = "Expected no faults")]
    fn test_assert_no_faults_fails() {
        let state = sample().with_fault(Fault::signalled(FaultError::new("bad")));
        assert_no_faults(&state);
    }

    #[test]
    fn test_assert_done_and_context() {
        let state = sample();
        assert_done(&state, &["a"]);
        assert_context_value(&state, "x", &json!(1));
        assert_context_missing(&state, "y");
    }

    #[test]
    fn test_assert_fault_from() {
        let state = sample().with_fault(
            Fault::thrown(FaultError::new("boom")).with_step(StepDescriptor::new("b")),
        );
        assert_fault_from(&state, "b", OriginKind::Thrown);
    }

    #[test]
    #[should_panic(expected = "Expected one fault from 'c'")]
    fn test_assert_fault_from_fails() {
        assert_fault_from(&sample(), "c", OriginKind::Signalled);
    }
}
