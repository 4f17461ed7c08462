//! Benchmarks for branch merging and pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use std::sync::Arc;
use stepline::core::{PipelineState, StepDescriptor};
use stepline::pipeline::{merge_states, merge_values, Runner, SpecItem};
use stepline::steps::{NoOpStep, StepRegistry};

fn wide_value(prefix: &str, width: usize) -> Value {
    let mut map = serde_json::Map::new();
    for i in 0..width {
        map.insert(
            format!("{prefix}_{i}"),
            json!({"tags": [i, i + 1], "nested": {"n": i}}),
        );
    }
    Value::Object(map)
}

fn merge_benchmark(c: &mut Criterion) {
    let left = wide_value("left", 200);
    let right = wide_value("right", 200);
    c.bench_function("merge_values_disjoint", |b| {
        b.iter(|| merge_values(black_box(left.clone()), black_box(right.clone())));
    });

    let overlapping = wide_value("left", 200);
    c.bench_function("merge_values_overlapping", |b| {
        b.iter(|| merge_values(black_box(left.clone()), black_box(overlapping.clone())));
    });

    let mut base = PipelineState::new();
    for i in 0..50 {
        base.done.push(StepDescriptor::new(format!("step_{i}")));
    }
    let mut branch = base.clone();
    branch.done.push(StepDescriptor::new("branch"));
    c.bench_function("merge_states_shared_history", |b| {
        b.iter(|| merge_states(&base, black_box(branch.clone()), black_box(base.clone())));
    });
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
fn runner_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let registry = Arc::new(StepRegistry::new());
    for i in 0..8 {
        registry.register(Arc::new(NoOpStep::new(format!("s{i}"))));
    }
    let runner = Runner::new(registry);

    let sequential: Vec<SpecItem> = (0..8).map(|i| SpecItem::unit(format!("s{i}"))).collect();
    c.bench_function("run_sequential_8", |b| {
        b.iter(|| {
            let state = stepline::pipeline::loader::state_from_items(&sequential).unwrap();
            runtime.block_on(runner.run(state)).unwrap()
        });
    });

    let grouped = vec![SpecItem::parallel(sequential.clone())];
    c.bench_function("run_parallel_8", |b| {
        b.iter(|| {
            let state = stepline::pipeline::loader::state_from_items(&grouped).unwrap();
            runtime.block_on(runner.run(state)).unwrap()
        });
    });
}

criterion_group!(benches, merge_benchmark, runner_benchmark);
criterion_main!(benches);
