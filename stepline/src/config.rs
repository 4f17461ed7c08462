//! Engine configuration.
//!
//! Loaded from JSON or built in code. Every named pipeline is validated when
//! the configuration is loaded, so a bad specification is reported at startup
//! rather than on first use.

use crate::errors::EngineError;
use crate::pipeline::loader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

/// Default parallel-group join timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Defaults applied to every run unless overridden per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDefaults {
    /// Raise faults immediately.
    #[serde(default)]
    pub crash: bool,
    /// Emit diagnostics and debug-level reports.
    #[serde(default)]
    pub debug: bool,
    /// Emit detailed diagnostics and verbose reports.
    #[serde(default)]
    pub verbose: bool,
    /// Parallel-group join timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            crash: false,
            debug: false,
            verbose: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RunDefaults {
    /// Returns the join timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// Single-line human-readable output.
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: RunDefaults,
    /// Units disabled for every run.
    #[serde(default)]
    pub disabled: BTreeSet<String>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named pipelines: owner, then pipeline name, then specification list.
    #[serde(default)]
    pub pipelines: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
}

impl EngineConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or a pipeline is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Adds a named pipeline.
    #[must_use]
    pub fn with_pipeline(
        mut self,
        owner: impl Into<String>,
        name: impl Into<String>,
        spec: Vec<Value>,
    ) -> Self {
        self.pipelines
            .entry(owner.into())
            .or_default()
            .insert(name.into(), spec);
        self
    }

    /// Sets the run defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: RunDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Disables a unit for every run.
    #[must_use]
    pub fn with_disabled(mut self, unit: impl Into<String>) -> Self {
        self.disabled.insert(unit.into());
        self
    }

    /// Looks up a named pipeline's specification list.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PipelineNotFound`] if the owner or the name is unknown.
    pub fn lookup(&self, owner: &str, name: &str) -> Result<&[Value], EngineError> {
        self.pipelines
            .get(owner)
            .and_then(|pipelines| pipelines.get(name))
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::PipelineNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    /// Checks every named pipeline against the specification grammar.
    ///
    /// # Errors
    ///
    /// Returns the first malformed pipeline.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.defaults.timeout_ms == 0 {
            return Err(EngineError::Config("defaults.timeout_ms must be positive".to_string()));
        }
        for (owner, pipelines) in &self.pipelines {
            for (name, spec) in pipelines {
                loader::state_from_values(spec).map_err(|e| {
                    EngineError::Config(format!("pipeline '{owner}/{name}': {e}"))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.defaults, RunDefaults::default());
        assert_eq!(config.defaults.timeout(), Duration::from_millis(5000));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.pipelines.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_json_str(
            r#"{
                "defaults": {"crash": true, "timeout_ms": 250},
                "disabled": ["notify"],
                "logging": {"level": "debug", "format": "json"},
                "pipelines": {
                    "orders": {
                        "checkout": ["validate", ["reserve", "charge"], {"step": "notify"}]
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(config.defaults.crash);
        assert!(!config.defaults.debug);
        assert_eq!(config.defaults.timeout_ms, 250);
        assert!(config.disabled.contains("notify"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.lookup("orders", "checkout").unwrap().len(), 3);
    }

    #[test]
    fn test_lookup_missing() {
        let config = EngineConfig::new().with_pipeline("orders", "checkout", vec![json!("a")]);

        let err = config.lookup("orders", "refund").unwrap_err();
        assert!(matches!(err, EngineError::PipelineNotFound { ref name, .. } if name == "refund"));
        let err = config.lookup("billing", "checkout").unwrap_err();
        assert!(matches!(err, EngineError::PipelineNotFound { ref owner, .. } if owner == "billing"));
    }

    #[test]
    fn test_malformed_pipeline_rejected_at_load() {
        let err = EngineConfig::from_json_str(r#"{"pipelines": {"o": {"p": ["a", []]}}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(ref m) if m.contains("o/p")));

        let err = EngineConfig::from_json_str(r#"{"defaults": {"timeout_ms": 0}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"pipelines": {{"o": {{"p": ["a", "b"]}}}}}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.lookup("o", "p").unwrap(), &[json!("a"), json!("b")]);

        let err = EngineConfig::from_file("/nonexistent/stepline.json").unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
