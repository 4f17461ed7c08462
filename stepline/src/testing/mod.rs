//! Testing utilities for stepline pipelines.
//!
//! This module provides:
//! - Mock steps covering every outcome channel
//! - A pipeline test harness
//! - Assertions over pipeline states

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_context_missing, assert_context_value, assert_done, assert_fault_from,
    assert_no_faults,
};
pub use fixtures::TestPipeline;
pub use mocks::{
    ExitingStep, FailingStep, Malformation, MalformedStep, PanickingStep, RecordedCall,
    RecordingStep, SetKeyStep, SlowStep, ThrowingStep,
};
