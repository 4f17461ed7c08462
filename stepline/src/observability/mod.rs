//! Logging setup.

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::EngineError;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the configured level.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter or a global subscriber
/// is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), EngineError> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(directives.as_deref(), &config.level)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|e| EngineError::Config(format!("failed to install subscriber: {e}")))
}

/// Env directives win when they parse; otherwise the configured level applies.
fn build_filter(directives: Option<&str>, level: &str) -> Result<EnvFilter, EngineError> {
    if let Some(filter) = directives.and_then(|d| EnvFilter::try_new(d).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| EngineError::Config(format!("invalid log level '{level}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_configured_level_is_used_without_env() {
        let filter = build_filter(None, "debug").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_env_directives_take_precedence() {
        let filter = build_filter(Some("stepline=trace"), "app=loud").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_invalid_level_is_a_config_error() {
        let err = build_filter(None, "app=loud").unwrap_err();
        assert!(matches!(err, EngineError::Config(ref m) if m.starts_with("invalid log level 'app=loud'")));

        let err = build_filter(Some("app=loud"), "app=louder").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_filter_drives_a_scoped_subscriber() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(build_filter(None, "warn").unwrap())
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        assert!(!tracing::enabled!(tracing::Level::INFO));
        assert!(tracing::enabled!(tracing::Level::WARN));
    }
}
