//! Core data model for stepline.
//!
//! This module contains the types threaded through every run:
//! - Step descriptors and their options
//! - Pipeline state with its pending-steps tree
//! - Fault records and report rendering
//! - The outcome a step returns

mod descriptor;
mod fault;
mod outcome;
mod state;

pub use descriptor::{Options, StepDescriptor};
pub use fault::{Fault, FaultError, OriginKind, Verbosity};
pub use outcome::Outcome;
pub use state::{Context, PendingEntry, PipelineState, RunFlags};
