//! Turning declarative step lists into a pending-steps tree.
//!
//! Loading is all-or-nothing: the whole list is validated before any state
//! is built, so a malformed element never surfaces partway through a run.

use crate::core::{Options, PendingEntry, PipelineState, StepDescriptor};
use crate::errors::SpecError;
use regex::Regex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::OnceLock;

const UNIT_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*((::|\.)[A-Za-z_][A-Za-z0-9_]*)*$";

#[allow(clippy::expect_used)]
fn unit_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UNIT_NAME_PATTERN).expect("unit name pattern is valid"))
}

/// One element of a pipeline specification.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecItem {
    /// A bare unit reference.
    Unit(String),
    /// A unit with options (and optional metadata).
    Configured {
        /// The unit name.
        unit: String,
        /// The step options.
        options: Options,
        /// Opaque metadata.
        meta: Value,
    },
    /// A group run concurrently.
    Parallel(Vec<SpecItem>),
}

impl SpecItem {
    /// Creates a bare unit reference.
    #[must_use]
    pub fn unit(unit: impl Into<String>) -> Self {
        Self::Unit(unit.into())
    }

    /// Creates a unit with options.
    #[must_use]
    pub fn with_options(unit: impl Into<String>, options: Options) -> Self {
        Self::Configured {
            unit: unit.into(),
            options,
            meta: Value::Null,
        }
    }

    /// Creates a parallel group.
    #[must_use]
    pub fn parallel(items: impl IntoIterator<Item = SpecItem>) -> Self {
        Self::Parallel(items.into_iter().collect())
    }

    /// Parses one element of the JSON specification format.
    ///
    /// A string is a bare unit, an object `{"step", "options", "meta"}` is a
    /// configured unit, and an array is a parallel group.
    ///
    /// # Errors
    ///
    /// Returns an error for any other shape.
    pub fn from_value(value: &Value) -> Result<Self, SpecError> {
        let mut path = Vec::new();
        parse_value(value, &mut path)
    }
}

impl From<&str> for SpecItem {
    fn from(unit: &str) -> Self {
        Self::Unit(unit.to_string())
    }
}

fn parse_value(value: &Value, path: &mut Vec<usize>) -> Result<SpecItem, SpecError> {
    match value {
        Value::String(unit) => Ok(SpecItem::Unit(unit.clone())),
        Value::Object(map) => {
            if let Some(unknown) = map
                .keys()
                .find(|k| !matches!(k.as_str(), "step" | "options" | "meta"))
            {
                return Err(SpecError::new(format!("unknown key '{unknown}' in step entry")).at(path));
            }
            let unit = match map.get("step") {
                Some(Value::String(unit)) => unit.clone(),
                Some(other) => {
                    return Err(
                        SpecError::new(format!("'step' must be a string, got {other}")).at(path)
                    )
                }
                None => return Err(SpecError::new("step entry is missing 'step'").at(path)),
            };
            let options = match map.get("options") {
                None | Some(Value::Null) => Options::new(),
                Some(Value::Object(options)) => options.clone(),
                Some(other) => {
                    return Err(SpecError::new(format!(
                        "options of '{unit}' must be an object, got {other}"
                    ))
                    .at(path))
                }
            };
            let meta = map.get("meta").cloned().unwrap_or(Value::Null);
            Ok(SpecItem::Configured { unit, options, meta })
        }
        Value::Array(items) => {
            let mut group = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(i);
                group.push(parse_value(item, path)?);
                path.pop();
            }
            Ok(SpecItem::Parallel(group))
        }
        other => Err(SpecError::new(format!(
            "expected a step name, a step object or a parallel list, got {other}"
        ))
        .at(path)),
    }
}

/// Parses a JSON specification list.
///
/// # Errors
///
/// Returns the first malformed element, with its index path.
pub fn parse_values(values: &[Value]) -> Result<Vec<SpecItem>, SpecError> {
    let mut path = Vec::new();
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            path.push(i);
            let item = parse_value(value, &mut path);
            path.pop();
            item
        })
        .collect()
}

/// Loads specification items into a pending-steps tree.
///
/// # Errors
///
/// Returns an error for an invalid unit name or an empty parallel group.
pub fn load(items: &[SpecItem]) -> Result<VecDeque<PendingEntry>, SpecError> {
    let mut path = Vec::new();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            path.push(i);
            let entry = load_item(item, &mut path);
            path.pop();
            entry
        })
        .collect()
}

fn load_item(item: &SpecItem, path: &mut Vec<usize>) -> Result<PendingEntry, SpecError> {
    match item {
        SpecItem::Unit(unit) => {
            validate_unit(unit, path)?;
            Ok(PendingEntry::Step(StepDescriptor::new(unit.clone())))
        }
        SpecItem::Configured { unit, options, meta } => {
            validate_unit(unit, path)?;
            Ok(PendingEntry::Step(
                StepDescriptor::new(unit.clone())
                    .with_options(options.clone())
                    .with_meta(meta.clone()),
            ))
        }
        SpecItem::Parallel(group) => {
            if group.is_empty() {
                return Err(SpecError::new("parallel group is empty").at(path));
            }
            let mut entries = Vec::with_capacity(group.len());
            for (i, nested) in group.iter().enumerate() {
                path.push(i);
                entries.push(load_item(nested, path)?);
                path.pop();
            }
            Ok(PendingEntry::Parallel(entries))
        }
    }
}

fn validate_unit(unit: &str, path: &[usize]) -> Result<(), SpecError> {
    if unit_name_regex().is_match(unit) {
        Ok(())
    } else {
        Err(SpecError::new(format!("'{unit}' is not a valid unit name")).at(path))
    }
}

/// Builds a fresh state from specification items.
///
/// # Errors
///
/// Returns an error if any item is malformed.
pub fn state_from_items(items: &[SpecItem]) -> Result<PipelineState, SpecError> {
    Ok(PipelineState::with_pending(load(items)?))
}

/// Builds a fresh state from a JSON specification list.
///
/// # Errors
///
/// Returns an error if any element is malformed.
pub fn state_from_values(values: &[Value]) -> Result<PipelineState, SpecError> {
    state_from_items(&parse_values(values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Vec<Value> {
        match v {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    #[test]
    fn test_load_mixed_spec() {
        let spec = values(json!([
            "validate",
            {"step": "persist", "options": {"repo": "main"}},
            ["index", {"step": "notify", "meta": {"owner": "ops"}}],
            "Search.Reindex"
        ]));

        let state = state_from_values(&spec).unwrap();
        assert_eq!(state.pending.len(), 4);
        assert_eq!(state.pending_steps(), 5);

        match &state.pending[1] {
            PendingEntry::Step(step) => {
                assert_eq!(step.unit(), "persist");
                assert_eq!(step.option("repo"), Some(&json!("main")));
            }
            other => panic!("expected step, got {other:?}"),
        }
        match &state.pending[2] {
            PendingEntry::Parallel(group) => {
                assert_eq!(group.len(), 2);
                assert!(matches!(&group[1], PendingEntry::Step(s) if s.meta()["owner"] == "ops"));
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn test_same_unit_twice_gets_distinct_descriptors() {
        let state = state_from_items(&["a".into(), "a".into()]).unwrap();
        match (&state.pending[0], &state.pending[1]) {
            (PendingEntry::Step(x), PendingEntry::Step(y)) => assert!(!x.same_entity(y)),
            _ => panic!("expected two steps"),
        }
    }

    #[test]
    fn test_rejects_bad_shapes_with_path() {
        let err = state_from_values(&values(json!(["a", ["b", 42]]))).unwrap_err();
        assert_eq!(err.path, vec![1, 1]);

        let err = state_from_values(&values(json!([{"options": {}}]))).unwrap_err();
        assert!(err.message.contains("missing 'step'"));

        let err = state_from_values(&values(json!([{"step": "a", "options": [1]}]))).unwrap_err();
        assert!(err.message.contains("must be an object"));

        let err = state_from_values(&values(json!([{"step": "a", "extra": 1}]))).unwrap_err();
        assert!(err.message.contains("unknown key 'extra'"));

        let err = state_from_values(&values(json!([null]))).unwrap_err();
        assert_eq!(err.path, vec![0]);
    }

    #[test]
    fn test_rejects_invalid_names_and_empty_groups() {
        let err = state_from_items(&[SpecItem::unit("ok"), SpecItem::unit("not valid")]).unwrap_err();
        assert_eq!(err.path, vec![1]);

        let err = state_from_items(&[SpecItem::parallel(vec![])]).unwrap_err();
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn test_nested_groups_load_recursively() {
        let items = vec![SpecItem::parallel(vec![
            SpecItem::unit("a"),
            SpecItem::parallel(vec![SpecItem::unit("b"), SpecItem::unit("c")]),
        ])];
        let pending = load(&items).unwrap();
        assert_eq!(pending[0].step_count(), 3);
    }
}
