//! Pipeline loading and execution.
//!
//! This module provides:
//! - The specification loader
//! - The runner (sequential steps and parallel groups)
//! - Branch merging
//! - The named-pipeline engine

mod engine;
pub mod loader;
mod merge;
mod runner;


pub use engine::{extract, Engine, RunFailure, RunOptions, RunOutcome};
pub use loader::SpecItem;
pub use merge::{merge_contexts, merge_maps, merge_states, merge_values};
pub use runner::{run_nested, Runner, DEFAULT_JOIN_TIMEOUT};
