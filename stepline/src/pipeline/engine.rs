//! The run entry point: named-pipeline lookup plus result extraction.

use super::loader;
use super::runner::Runner;
use crate::config::EngineConfig;
use crate::core::{PipelineState, RunFlags};
use crate::diagnostics::{DiagnosticsSink, TracingSink};
use crate::errors::EngineError;
use crate::steps::StepRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-invocation options; unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Raise faults immediately.
    pub crash: Option<bool>,
    /// Emit diagnostics and debug-level reports.
    pub debug: Option<bool>,
    /// Emit detailed diagnostics and verbose reports.
    pub verbose: Option<bool>,
    /// Context key to return on success; the whole context when unset.
    pub on: Option<String>,
    /// Parallel-group join timeout.
    pub timeout: Option<Duration>,
    /// Return the whole final state instead of a report when the run failed.
    pub return_full_state_on_error: bool,
    /// Initial context entries.
    pub assigns: serde_json::Map<String, Value>,
    /// Units disabled for this invocation only.
    pub disabled: Vec<String>,
}

impl RunOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets crash mode.
    #[must_use]
    pub fn crash(mut self, crash: bool) -> Self {
        self.crash = Some(crash);
        self
    }

    /// Sets debug mode.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Sets verbose mode.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Returns only this context key on success.
    #[must_use]
    pub fn on(mut self, key: impl Into<String>) -> Self {
        self.on = Some(key.into());
        self
    }

    /// Sets the join timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the whole state when the run fails.
    #[must_use]
    pub fn return_full_state_on_error(mut self, enabled: bool) -> Self {
        self.return_full_state_on_error = enabled;
        self
    }

    /// Adds an initial context entry.
    #[must_use]
    pub fn assign(mut self, key: impl Into<String>, value: Value) -> Self {
        self.assigns.insert(key.into(), value);
        self
    }

    /// Disables a unit for this invocation.
    #[must_use]
    pub fn disable(mut self, unit: impl Into<String>) -> Self {
        self.disabled.push(unit.into());
        self
    }
}

/// What a failed run hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum RunFailure {
    /// The rendered fault report.
    Report(String),
    /// The whole final state.
    State(Box<PipelineState>),
}

/// The result of a run that was not aborted.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No fault was recorded; carries the extracted result.
    Succeeded(Value),
    /// At least one fault was recorded.
    Failed(RunFailure),
}

impl RunOutcome {
    /// Returns true if the run recorded no fault.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Returns the extracted result of a successful run.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Succeeded(value) => Some(value),
            Self::Failed(_) => None,
        }
    }
}

/// Runs named pipelines from a configuration against a step registry.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: Arc<StepRegistry>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Engine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: EngineConfig, registry: Arc<StepRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            sink: Arc::new(TracingSink),
        }
    }

    /// Sets the diagnostics sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Builds the initial state of a named pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is unknown or malformed.
    pub fn load(&self, owner: &str, name: &str) -> Result<PipelineState, EngineError> {
        let spec = self.config.lookup(owner, name)?;
        Ok(loader::state_from_values(spec)?)
    }

    /// Builds the runner for one invocation.
    #[must_use]
    pub fn runner(&self, options: &RunOptions) -> Runner {
        let defaults = &self.config.defaults;
        let flags = RunFlags {
            crash: options.crash.unwrap_or(defaults.crash),
            debug: options.debug.unwrap_or(defaults.debug),
            verbose: options.verbose.unwrap_or(defaults.verbose),
        };
        let disabled = self
            .config
            .disabled
            .iter()
            .cloned()
            .chain(options.disabled.iter().cloned());

        Runner::new(Arc::clone(&self.registry))
            .with_flags(flags)
            .with_join_timeout(options.timeout.unwrap_or_else(|| defaults.timeout()))
            .with_disabled(disabled)
            .with_sink(Arc::clone(&self.sink))
    }

    /// Runs the named pipeline of `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error when the pipeline cannot be found or loaded, when a
    /// fatal condition aborts the run, and for any fault in crash mode.
    /// Faults recorded in non-crash mode are reported through
    /// [`RunOutcome::Failed`] instead.
    pub async fn run(&self, owner: &str, name: &str, options: RunOptions) -> Result<RunOutcome, EngineError> {
        let mut state = self.load(owner, name)?;
        for (key, value) in &options.assigns {
            state.assign(key.clone(), value.clone());
        }
        debug!(owner, pipeline = name, steps = state.pending_steps(), "Loaded pipeline");

        let runner = self.runner(&options);
        let finished = runner.run(state).await?;

        if finished.has_faults() {
            info!(owner, pipeline = name, faults = finished.faults.len(), "Pipeline completed with faults");
            let failure = if options.return_full_state_on_error {
                RunFailure::State(Box::new(finished))
            } else {
                RunFailure::Report(finished.render_faults(runner.flags().verbosity()))
            };
            return Ok(RunOutcome::Failed(failure));
        }

        Ok(RunOutcome::Succeeded(extract(finished, options.on.as_deref())))
    }
}

/// Picks the caller's result out of a finished state.
#[must_use]
pub fn extract(state: PipelineState, on: Option<&str>) -> Value {
    let mut context = state.context;
    match on {
        Some(key) => context.remove(key).unwrap_or(Value::Null),
        None => Value::Object(context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract() {
        let state = PipelineState::new().with_value("a", json!(1)).with_value("b", json!(2));
        assert_eq!(extract(state.clone(), Some("b")), json!(2));
        assert_eq!(extract(state.clone(), Some("missing")), Value::Null);
        assert_eq!(extract(state, None), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_options_override_defaults() {
        let config = EngineConfig::new().with_disabled("audit");
        let engine = Engine::new(config, Arc::new(StepRegistry::new()));

        let runner = engine.runner(&RunOptions::new().crash(true).timeout(Duration::from_millis(10)));
        assert!(runner.flags().crash);
        assert!(!runner.flags().debug);
        assert_eq!(runner.join_timeout(), Duration::from_millis(10));

        let runner = engine.runner(&RunOptions::new());
        assert!(!runner.flags().crash);
        assert_eq!(runner.join_timeout(), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_unknown_pipeline() {
        let engine = Engine::new(EngineConfig::new(), Arc::new(StepRegistry::new()));
        let err = engine.run("nobody", "nothing", RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::PipelineNotFound { .. }));
    }
}
