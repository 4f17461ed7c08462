//! # Stepline
//!
//! A workflow orchestration engine that threads one state through an ordered
//! list of steps.
//!
//! Stepline provides:
//!
//! - **Sequential and parallel execution**: plain steps run in order, nested
//!   lists run concurrently and are merged back at a join
//! - **Recorded faults**: step failures are captured as fault records and the
//!   run carries on, unless crash mode asks for an immediate abort
//! - **Declarative pipelines**: named pipelines loaded from JSON configuration
//! - **Diagnostics**: opt-in per run or per step, routed to a pluggable sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepline::prelude::*;
//!
//! let registry = Arc::new(StepRegistry::new());
//! registry.register_fn("load", |mut state: PipelineState, _step: &StepDescriptor| {
//!     state.assign("x", json!(1));
//!     Ok(Outcome::State(state))
//! });
//!
//! let config = EngineConfig::new().with_pipeline("orders", "checkout", vec![json!("load")]);
//! let outcome = Engine::new(config, registry)
//!     .run("orders", "checkout", RunOptions::new().on("x"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, LogFormat, LoggingConfig, RunDefaults};
    pub use crate::core::{
        Context, Fault, FaultError, Options, OriginKind, Outcome, PendingEntry, PipelineState,
        RunFlags, StepDescriptor, Verbosity,
    };
    pub use crate::diagnostics::{maybe_emit, CollectingSink, DiagnosticsSink, NoOpSink, TracingSink};
    pub use crate::errors::{EngineError, ExitReason, SpecError, StepError};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        run_nested, Engine, RunFailure, RunOptions, RunOutcome, Runner, SpecItem,
    };
    pub use crate::steps::transaction::{Transaction, TransactionHook};
    pub use crate::steps::{AsyncFnStep, FnStep, NoOpStep, Step, StepRegistry};
}
