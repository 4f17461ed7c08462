//! Step descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Ordered option mapping attached to a step.
pub type Options = serde_json::Map<String, Value>;

/// An immutable record naming a unit of work, its options, and opaque metadata.
///
/// Every descriptor carries its own identity, so the same unit may appear
/// several times in one pipeline (with different options) and each occurrence
/// stays distinguishable in `done` and in fault reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    id: Uuid,
    unit: String,
    #[serde(default)]
    options: Options,
    #[serde(default)]
    meta: Value,
}

impl StepDescriptor {
    /// Creates a descriptor with empty options.
    #[must_use]
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit: unit.into(),
            options: Options::new(),
            meta: Value::Null,
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Adds a single option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Replaces the metadata, keeping the descriptor's identity.
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Returns the descriptor identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the unit name.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns a single option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Returns a boolean option, treating absence as false.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.options.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Returns the metadata.
    #[must_use]
    pub fn meta(&self) -> &Value {
        &self.meta
    }

    /// Returns true if both descriptors are the same entity.
    #[must_use]
    pub fn same_entity(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.options.is_empty() {
            write!(f, "{}", self.unit)
        } else {
            write!(f, "{} {}", self.unit, Value::Object(self.options.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_creation() {
        let step = StepDescriptor::new("validate")
            .with_option("strict", json!(true))
            .with_option("max", json!(3));

        assert_eq!(step.unit(), "validate");
        assert!(step.flag("strict"));
        assert!(!step.flag("missing"));
        assert_eq!(step.option("max"), Some(&json!(3)));
        assert_eq!(step.meta(), &Value::Null);
    }

    #[test]
    fn test_same_unit_is_distinct_entity() {
        let a = StepDescriptor::new("index");
        let b = StepDescriptor::new("index");

        assert!(!a.same_entity(&b));
        assert_ne!(a, b);
        assert!(a.same_entity(&a.clone()));
    }

    #[test]
    fn test_with_meta_keeps_identity() {
        let step = StepDescriptor::new("notify");
        let id = step.id();
        let updated = step.with_meta(json!({"attempt": 2}));

        assert_eq!(updated.id(), id);
        assert_eq!(updated.meta()["attempt"], json!(2));
    }

    #[test]
    fn test_options_keep_insertion_order() {
        let step = StepDescriptor::new("persist")
            .with_option("zeta", json!(1))
            .with_option("alpha", json!(2));

        let keys: Vec<_> = step.options().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn test_display() {
        assert_eq!(StepDescriptor::new("a").to_string(), "a");
        let with_opts = StepDescriptor::new("b").with_option("k", json!("v"));
        assert_eq!(with_opts.to_string(), r#"b {"k":"v"}"#);
    }
}
