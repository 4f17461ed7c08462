//! Test fixtures for pipeline testing.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::mocks::SetKeyStep;
use crate::core::{Context, PipelineState};
use crate::diagnostics::CollectingSink;
use crate::errors::EngineError;
use crate::pipeline::{loader, Runner, SpecItem};
use crate::steps::{NoOpStep, Step, StepRegistry};

/// A pipeline under test: a registry, a specification and a diagnostics sink.
#[derive(Debug)]
pub struct TestPipeline {
    registry: Arc<StepRegistry>,
    items: Vec<SpecItem>,
    context: Context,
    sink: Arc<CollectingSink>,
    crash: bool,
    debug: bool,
    timeout: Option<Duration>,
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipeline {
    /// Creates an empty test pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(StepRegistry::new()),
            items: Vec::new(),
            context: Context::new(),
            sink: Arc::new(CollectingSink::new()),
            crash: false,
            debug: false,
            timeout: None,
        }
    }

    /// Creates a pipeline of `count` pass-through steps named `step_0`, `step_1`, ...
    #[must_use]
    pub fn linear(count: usize) -> Self {
        (0..count).fold(Self::new(), |pipeline, i| {
            let name = format!("step_{i}");
            pipeline
                .register(Arc::new(NoOpStep::new(name.clone())))
                .then(name.as_str())
        })
    }

    /// Registers a step without queueing it.
    #[must_use]
    pub fn register(self, step: Arc<dyn Step>) -> Self {
        self.registry.register(step);
        self
    }

    /// Registers a step and queues it.
    #[must_use]
    pub fn step(self, step: Arc<dyn Step>) -> Self {
        let name = step.name().to_string();
        self.register(step).then(name.as_str())
    }

    /// Registers and queues a step writing `value` under `key`.
    #[must_use]
    pub fn set_key(self, name: &str, key: &str, value: Value) -> Self {
        self.step(Arc::new(SetKeyStep::new(name, key, value)))
    }

    /// Queues a specification item.
    #[must_use]
    pub fn then(mut self, item: impl Into<SpecItem>) -> Self {
        self.items.push(item.into());
        self
    }

    /// Queues a parallel group of already registered units.
    #[must_use]
    pub fn parallel(self, units: &[&str]) -> Self {
        self.then(SpecItem::parallel(units.iter().map(|u| SpecItem::unit(*u))))
    }

    /// Sets an initial context value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Enables crash mode.
    #[must_use]
    pub fn crash(mut self) -> Self {
        self.crash = true;
        self
    }

    /// Enables debug diagnostics.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Sets the join timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Returns the diagnostics collected so far.
    #[must_use]
    pub fn sink(&self) -> &Arc<CollectingSink> {
        &self.sink
    }

    /// Builds the initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the queued items do not load.
    pub fn state(&self) -> Result<PipelineState, EngineError> {
        Ok(loader::state_from_items(&self.items)?.with_context(self.context.clone()))
    }

    /// Builds the runner.
    #[must_use]
    pub fn runner(&self) -> Runner {
        let mut runner = Runner::new(Arc::clone(&self.registry))
            .with_crash(self.crash)
            .with_sink(self.sink.clone());
        if self.debug {
            let mut flags = runner.flags();
            flags.debug = true;
            runner = runner.with_flags(flags);
        }
        if let Some(timeout) = self.timeout {
            runner = runner.with_join_timeout(timeout);
        }
        runner
    }

    /// Loads and runs the pipeline.
    ///
    /// # Errors
    ///
    /// Returns loading errors and fatal run errors.
    pub async fn run(&self) -> Result<PipelineState, EngineError> {
        self.runner().run(self.state()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_linear_pipeline() {
        let pipeline = TestPipeline::linear(3);
        let state = pipeline.state().unwrap();
        assert_eq!(state.pending_steps(), 3);
        assert_eq!(pipeline.registry().names(), vec!["step_0", "step_1", "step_2"]);
    }

    #[test]
    fn test_runner_settings() {
        let pipeline = TestPipeline::new().crash().debug().timeout(Duration::from_millis(20));
        let runner = pipeline.runner();
        assert!(runner.flags().crash);
        assert!(runner.flags().debug);
        assert_eq!(runner.join_timeout(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_run_with_initial_context() {
        let finished = TestPipeline::new()
            .with_value("seed", json!(7))
            .set_key("a", "x", json!(1))
            .run()
            .await
            .unwrap();

        assert_eq!(finished.get("seed"), Some(&json!(7)));
        assert_eq!(finished.get("x"), Some(&json!(1)));
        assert_eq!(finished.done_units(), vec!["a"]);
    }
}
