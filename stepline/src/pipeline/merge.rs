//! Reconciling the results of parallel branches.
//!
//! Branches usually write disjoint context keys. Each branch is compared
//! against the state it was forked from: a key one branch left at its fork
//! value takes the other branch's value, so an untouched copy never overwrites
//! a sibling's write. When both branches changed the same key, values are
//! combined by shape:
//!
//! | left        | right       | result                                  |
//! |-------------|-------------|-----------------------------------------|
//! | list        | list        | concatenation, duplicates removed       |
//! | map         | map         | recursive merge                         |
//! | any         | null/absent | left                                    |
//! | null/absent | any         | right                                   |
//! | any         | any         | right                                   |

use crate::core::{Context, PipelineState};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Merges two values, the right-hand side winning scalar conflicts.
#[must_use]
pub fn merge_values(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Array(left), Value::Array(right)) => Value::Array(concat_dedup(left, right)),
        (Value::Object(left), Value::Object(right)) => Value::Object(merge_maps(left, right)),
        (left, Value::Null) => left,
        (_, right) => right,
    }
}

/// Deep-merges two context maps, keeping the left map's key order.
#[must_use]
pub fn merge_maps(mut left: Context, right: Context) -> Context {
    for (key, right_value) in right {
        match left.get_mut(&key) {
            Some(slot) => {
                let left_value = std::mem::take(slot);
                *slot = merge_values(left_value, right_value);
            }
            None => {
                left.insert(key, right_value);
            }
        }
    }
    left
}

fn concat_dedup(left: Vec<Value>, right: Vec<Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::with_capacity(left.len() + right.len());
    for value in left.into_iter().chain(right) {
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    merged
}

fn dedup_by_id<T>(left: Vec<T>, right: Vec<T>, id: impl Fn(&T) -> Uuid) -> Vec<T> {
    let mut seen = HashSet::with_capacity(left.len() + right.len());
    left.into_iter()
        .chain(right)
        .filter(|item| seen.insert(id(item)))
        .collect()
}

/// Three-way merge of two contexts forked from `base`.
///
/// Keys removed by one side and left alone by the other stay removed. Maps
/// changed on both sides are merged key by key against the base map; other
/// conflicts follow [`merge_values`].
#[must_use]
pub fn merge_contexts(base: &Context, left: Context, right: Context) -> Context {
    let mut shared = HashMap::new();
    let mut right_only = Vec::new();
    for (key, value) in right {
        if left.contains_key(&key) {
            shared.insert(key, value);
        } else {
            right_only.push((key, value));
        }
    }

    let mut merged = Context::new();
    for (key, left_value) in left {
        let right_value = shared.remove(&key);
        if let Some(value) = merge_key(base.get(&key), Some(left_value), right_value) {
            merged.insert(key, value);
        }
    }
    for (key, right_value) in right_only {
        if let Some(value) = merge_key(base.get(&key), None, Some(right_value)) {
            merged.insert(key, value);
        }
    }
    merged
}

fn merge_key(base: Option<&Value>, left: Option<Value>, right: Option<Value>) -> Option<Value> {
    if right.as_ref() == base {
        return left;
    }
    if left.as_ref() == base {
        return right;
    }
    match (left, right) {
        (Some(Value::Object(left)), Some(Value::Object(right))) => Some(Value::Object(match base {
            Some(Value::Object(base)) => merge_contexts(base, left, right),
            _ => merge_maps(left, right),
        })),
        (Some(left), Some(right)) => Some(merge_values(left, right)),
        (left, right) => left.or(right),
    }
}

/// Merges two branch results forked from `base` into one state.
///
/// Contexts are merged with [`merge_contexts`]; `done` and `faults` are
/// concatenated with shared entries (those inherited from before the fork)
/// kept once. `pending` and `flags` come from the left side.
#[must_use]
pub fn merge_states(base: &PipelineState, left: PipelineState, right: PipelineState) -> PipelineState {
    PipelineState {
        done: dedup_by_id(left.done, right.done, |d| d.id()),
        faults: dedup_by_id(left.faults, right.faults, |f| f.id()),
        context: merge_contexts(&base.context, left.context, right.context),
        pending: left.pending,
        flags: left.flags,
    }
}
