//! Step trait and implementations.
//!
//! Steps are the units of work a pipeline composes. A step receives the
//! current state together with its own descriptor and returns an
//! [`Outcome`]; everything else it does (I/O, persistence) is its own
//! business.

mod registry;
pub mod transaction;

pub use registry::{Resolution, SkipReason, StepRegistry};

use crate::core::{Outcome, PipelineState, StepDescriptor};
use crate::errors::StepError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for pipeline steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the unit name the step is registered under.
    fn name(&self) -> &str;

    /// Runs the step.
    ///
    /// `state.pending` holds the steps that follow this one, so a step may
    /// splice them out and run them itself.
    async fn run(&self, state: PipelineState, step: &StepDescriptor) -> Result<Outcome, StepError>;
}

/// A step backed by a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(PipelineState, &StepDescriptor) -> Result<Outcome, StepError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(PipelineState, &StepDescriptor) -> Result<Outcome, StepError> + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(PipelineState, &StepDescriptor) -> Result<Outcome, StepError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(PipelineState, &StepDescriptor) -> Result<Outcome, StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, step: &StepDescriptor) -> Result<Outcome, StepError> {
        (self.func)(state, step)
    }
}

/// A step backed by an async closure.
pub struct AsyncFnStep<F, Fut>
where
    F: Fn(PipelineState, StepDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, StepError>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStep<F, Fut>
where
    F: Fn(PipelineState, StepDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, StepError>> + Send,
{
    /// Creates a new async function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStep<F, Fut>
where
    F: Fn(PipelineState, StepDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, StepError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F, Fut>
where
    F: Fn(PipelineState, StepDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome, StepError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, step: &StepDescriptor) -> Result<Outcome, StepError> {
        (self.func)(state, step.clone()).await
    }
}

/// A step that passes the state through unchanged.
#[derive(Debug, Clone)]
pub struct NoOpStep {
    name: String,
}

impl NoOpStep {
    /// Creates a new no-op step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for NoOpStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: PipelineState, _step: &StepDescriptor) -> Result<Outcome, StepError> {
        Ok(Outcome::State(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep::new("double", |state: PipelineState, _: &StepDescriptor| {
            let x = state.get_i64("x").unwrap_or(0);
            Ok(Outcome::State(state.with_value("x", json!(x * 2))))
        });

        assert_eq!(step.name(), "double");

        let state = PipelineState::new().with_value("x", json!(21));
        let outcome = step.run(state, &StepDescriptor::new("double")).await.unwrap();
        match outcome {
            Outcome::State(s) => assert_eq!(s.get_i64("x"), Some(42)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_async_fn_step_sees_options() {
        let step = AsyncFnStep::new("greet", |state: PipelineState, desc: StepDescriptor| async move {
            let name = desc.option("name").cloned().unwrap_or(json!("world"));
            Ok::<_, StepError>(Outcome::State(state.with_value("greeting", name)))
        });

        let desc = StepDescriptor::new("greet").with_option("name", json!("ada"));
        let outcome = step.run(PipelineState::new(), &desc).await.unwrap();
        match outcome {
            Outcome::State(s) => assert_eq!(s.get("greeting"), Some(&json!("ada"))),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_noop_step() {
        let step = NoOpStep::new("noop");
        let state = PipelineState::new().with_value("k", json!(1));

        let outcome =
            tokio_test::block_on(step.run(state.clone(), &StepDescriptor::new("noop"))).unwrap();
        assert_eq!(outcome, Outcome::State(state));
    }
}
