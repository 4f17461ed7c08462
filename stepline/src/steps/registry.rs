//! Registry resolving unit names to step implementations.

use super::{FnStep, Step};
use crate::core::{Outcome, PipelineState, StepDescriptor};
use crate::errors::StepError;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
enum UnitEntry {
    Runnable(Arc<dyn Step>),
    Declared,
}

/// Why a step was skipped without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No unit is registered under the name.
    Unregistered,
    /// The unit is disabled.
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// The result of looking up a unit.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The unit can run.
    Run(Arc<dyn Step>),
    /// The unit is soft-skipped.
    Skip(SkipReason),
    /// The unit is known but has nothing to run.
    MissingEntryPoint,
}

/// Lookup table of step units, built at startup.
#[derive(Default)]
pub struct StepRegistry {
    units: RwLock<HashMap<String, UnitEntry>>,
    disabled: RwLock<HashSet<String>>,
}

impl StepRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step under its own name.
    pub fn register(&self, step: Arc<dyn Step>) {
        let name = step.name().to_string();
        self.units.write().insert(name, UnitEntry::Runnable(step));
    }

    /// Registers a step under an explicit name.
    pub fn register_as(&self, name: impl Into<String>, step: Arc<dyn Step>) {
        self.units.write().insert(name.into(), UnitEntry::Runnable(step));
    }

    /// Registers a synchronous closure as a step.
    pub fn register_fn<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(PipelineState, &StepDescriptor) -> Result<Outcome, StepError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let step = Arc::new(FnStep::new(name.clone(), func));
        self.units.write().insert(name, UnitEntry::Runnable(step));
    }

    /// Declares a unit name without an implementation.
    ///
    /// Resolving a declared unit is a configuration error, unlike an unknown
    /// name which is skipped.
    pub fn declare(&self, name: impl Into<String>) {
        self.units.write().insert(name.into(), UnitEntry::Declared);
    }

    /// Disables a unit for every run.
    pub fn disable(&self, name: impl Into<String>) {
        self.disabled.write().insert(name.into());
    }

    /// Re-enables a unit.
    pub fn enable(&self, name: &str) {
        self.disabled.write().remove(name);
    }

    /// Returns true if a unit is registered or declared under the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.units.read().contains_key(name)
    }

    /// Lists registered unit names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.units.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolves a unit, honouring both registry-wide and per-run disabled sets.
    #[must_use]
    pub fn resolve(&self, unit: &str, disabled_for_run: &HashSet<String>) -> Resolution {
        if disabled_for_run.contains(unit) || self.disabled.read().contains(unit) {
            return Resolution::Skip(SkipReason::Disabled);
        }

        match self.units.read().get(unit) {
            Some(UnitEntry::Runnable(step)) => Resolution::Run(Arc::clone(step)),
            Some(UnitEntry::Declared) => Resolution::MissingEntryPoint,
            None => Resolution::Skip(SkipReason::Unregistered),
        }
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("units", &self.names())
            .field("disabled", &*self.disabled.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::NoOpStep;

    fn no_extra() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = StepRegistry::new();
        registry.register(Arc::new(NoOpStep::new("noop")));

        assert!(registry.contains("noop"));
        match registry.resolve("noop", &no_extra()) {
            Resolution::Run(step) => assert_eq!(step.name(), "noop"),
            other => panic!("expected runnable, got {other:?}"),
        }
    }

    #[test]
    fn test_unregistered_is_skipped() {
        let registry = StepRegistry::new();
        assert!(matches!(
            registry.resolve("ghost", &no_extra()),
            Resolution::Skip(SkipReason::Unregistered)
        ));
    }

    #[test]
    fn test_disabled_is_skipped() {
        let registry = StepRegistry::new();
        registry.register(Arc::new(NoOpStep::new("index")));
        registry.disable("index");

        assert!(matches!(
            registry.resolve("index", &no_extra()),
            Resolution::Skip(SkipReason::Disabled)
        ));

        registry.enable("index");
        assert!(matches!(registry.resolve("index", &no_extra()), Resolution::Run(_)));
    }

    #[test]
    fn test_disabled_for_run() {
        let registry = StepRegistry::new();
        registry.register(Arc::new(NoOpStep::new("notify")));
        let disabled: HashSet<String> = ["notify".to_string()].into_iter().collect();

        assert!(matches!(
            registry.resolve("notify", &disabled),
            Resolution::Skip(SkipReason::Disabled)
        ));
    }

    #[test]
    fn test_declared_has_no_entry_point() {
        let registry = StepRegistry::new();
        registry.declare("legacy");

        assert!(matches!(
            registry.resolve("legacy", &no_extra()),
            Resolution::MissingEntryPoint
        ));
    }

    #[test]
    fn test_register_fn_and_names() {
        let registry = StepRegistry::new();
        registry.register_fn("b", |state, _| Ok(Outcome::State(state)));
        registry.register_as("a", Arc::new(NoOpStep::new("noop")));

        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
