//! Diagnostics emitted by the engine and by step authors.
//!
//! The sink for the current run is scoped to the run's tasks, so steps can
//! call [`maybe_emit`] without being handed a sink. Outside of a run the
//! call goes to a [`TracingSink`].

mod sink;

pub use sink::{should_emit, CollectingSink, DiagnosticsSink, NoOpSink, TracingSink};

use crate::core::{Options, RunFlags};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT_SINK: Arc<dyn DiagnosticsSink>;
}

/// Runs `fut` with `sink` as the current diagnostics sink.
pub async fn scope<F: Future>(sink: Arc<dyn DiagnosticsSink>, fut: F) -> F::Output {
    CURRENT_SINK.scope(sink, fut).await
}

/// Returns the sink of the current run, or a [`TracingSink`] outside a run.
#[must_use]
pub fn current_sink() -> Arc<dyn DiagnosticsSink> {
    CURRENT_SINK
        .try_with(Arc::clone)
        .unwrap_or_else(|_| Arc::new(TracingSink))
}

/// Emits a diagnostic through the current sink, if the flags or step options ask for it.
pub fn maybe_emit(flags: &RunFlags, step_options: &Options, payload: &Value, label: &str) {
    current_sink().maybe_emit(flags, step_options, payload, label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scope_routes_to_sink() {
        let sink = Arc::new(CollectingSink::new());
        let flags = RunFlags {
            debug: true,
            ..RunFlags::default()
        };

        scope(sink.clone(), async {
            maybe_emit(&flags, &Options::new(), &json!({"step": "a"}), "custom");
        })
        .await;

        assert_eq!(sink.labels(), vec!["custom"]);
    }

    #[tokio::test]
    async fn test_outside_scope_falls_back() {
        // No scope: must not panic.
        maybe_emit(&RunFlags::default(), &Options::new(), &json!(null), "unscoped");
    }
}
