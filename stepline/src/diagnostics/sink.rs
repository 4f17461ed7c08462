//! Diagnostics sink trait and implementations.

use crate::core::{Options, RunFlags};
use serde_json::Value;
use tracing::debug;

/// Returns true if diagnostics should be emitted for this run and step.
///
/// Either the run is in debug/verbose mode, or the step's own options carry
/// `debug: true`.
#[must_use]
pub fn should_emit(flags: &RunFlags, step_options: &Options) -> bool {
    flags.debug
        || flags.verbose
        || step_options
            .get("debug")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

/// Receiver for opportunistic diagnostics from the engine and from steps.
///
/// Nothing the sink does feeds back into a run, so a sink that drops
/// everything is always valid.
pub trait DiagnosticsSink: Send + Sync + std::fmt::Debug {
    /// Emits `payload` under `label` if the flags or step options ask for it.
    fn maybe_emit(&self, flags: &RunFlags, step_options: &Options, payload: &Value, label: &str);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl DiagnosticsSink for NoOpSink {
    fn maybe_emit(&self, _flags: &RunFlags, _step_options: &Options, _payload: &Value, _label: &str) {
        // Intentionally empty - discards all diagnostics
    }
}

/// A sink that writes diagnostics through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn maybe_emit(&self, flags: &RunFlags, step_options: &Options, payload: &Value, label: &str) {
        if !should_emit(flags, step_options) {
            return;
        }
        debug!(label = %label, payload = %payload, "diagnostics: {}", label);
    }
}

/// A sink that keeps everything it emits, for tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: parking_lot::RwLock<Vec<(String, Value)>>,
}

impl CollectingSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected entries as `(label, payload)` pairs.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries.read().clone()
    }

    /// Returns the labels of all collected entries.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.entries.read().iter().map(|(l, _)| l.clone()).collect()
    }

    /// Returns the number of collected entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns entries whose label starts with the prefix.
    #[must_use]
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        self.entries
            .read()
            .iter()
            .filter(|(l, _)| l.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Clears all collected entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl DiagnosticsSink for CollectingSink {
    fn maybe_emit(&self, flags: &RunFlags, step_options: &Options, payload: &Value, label: &str) {
        if should_emit(flags, step_options) {
            self.entries.write().push((label.to_string(), payload.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn debug_flags() -> RunFlags {
        RunFlags {
            debug: true,
            ..RunFlags::default()
        }
    }

    #[test]
    fn test_should_emit_gating() {
        let quiet = RunFlags::default();
        assert!(!should_emit(&quiet, &Options::new()));
        assert!(should_emit(&debug_flags(), &Options::new()));

        let mut step_opts = Options::new();
        step_opts.insert("debug".into(), json!(true));
        assert!(should_emit(&quiet, &step_opts));
    }

    #[test]
    fn test_noop_and_tracing_sinks_do_not_panic() {
        NoOpSink.maybe_emit(&debug_flags(), &Options::new(), &json!({"x": 1}), "noop");
        TracingSink.maybe_emit(&debug_flags(), &Options::new(), &json!({"x": 1}), "tracing");
    }

    #[test]
    fn test_collecting_sink_respects_gating() {
        let sink = CollectingSink::new();
        sink.maybe_emit(&RunFlags::default(), &Options::new(), &json!(1), "dropped");
        assert!(sink.is_empty());

        sink.maybe_emit(&debug_flags(), &Options::new(), &json!(2), "step.started");
        sink.maybe_emit(&debug_flags(), &Options::new(), &json!(3), "run.finished");

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.labels(), vec!["step.started", "run.finished"]);
        assert_eq!(sink.entries_with_prefix("step.").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
