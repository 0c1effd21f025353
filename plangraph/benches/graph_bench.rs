//! Benchmarks for detail graph maintenance.

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use plangraph::core::{Ambiance, ExecutionStatus, Level, OrchestrationEvent, StepCategory};
use plangraph::model::{GraphVertex, NodeExecution, OrchestrationGraph, PlanExecution};
use plangraph::testing::TestEnv;

fn stage_with_steps(stage: usize, steps: usize) -> Vec<NodeExecution> {
    let stage_id = format!("stage{stage}");
    let stage_ambiance =
        Ambiance::new("plan").with_level(Level::new(stage_id.clone(), stage_id.clone(), StepCategory::Stage));
    let mut nodes = vec![NodeExecution::new(stage_id.clone(), stage_id.clone(), stage_ambiance.clone())
        .with_status(ExecutionStatus::Succeeded)];
    let mut previous: Option<String> = None;
    for step in 0..steps {
        let id = format!("{stage_id}-step{step}");
        let ambiance = stage_ambiance
            .clone()
            .with_level(Level::new(id.clone(), id.clone(), StepCategory::Step));
        let mut node = NodeExecution::new(id.clone(), id.clone(), ambiance)
            .with_parent(stage_id.clone())
            .with_status(ExecutionStatus::Succeeded);
        if let Some(prev) = previous.replace(id) {
            node = node.with_previous(prev);
        }
        nodes.push(node);
    }
    nodes
}

fn upsert_benchmark(c: &mut Criterion) {
    let nodes: Vec<NodeExecution> = (0..10).flat_map(|stage| stage_with_steps(stage, 20)).collect();

    c.bench_function("upsert_210_vertices_in_order", |b| {
        b.iter_batched(
            || OrchestrationGraph::new("plan", 0),
            |mut graph| {
                for node in &nodes {
                    graph.upsert_vertex(node, GraphVertex::from_node_execution(node, BTreeMap::new()));
                }
                black_box(graph)
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("upsert_210_vertices_reversed", |b| {
        b.iter_batched(
            || OrchestrationGraph::new("plan", 0),
            |mut graph| {
                for node in nodes.iter().rev() {
                    graph.upsert_vertex(node, GraphVertex::from_node_execution(node, BTreeMap::new()));
                }
                black_box(graph)
            },
            BatchSize::SmallInput,
        );
    });
}

fn router_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let nodes = stage_with_steps(0, 50);

    c.bench_function("route_51_status_updates", |b| {
        b.iter_batched(
            || {
                let env = Arc::new(TestEnv::new());
                env.plans.put(PlanExecution::running("plan", 0));
                for node in &nodes {
                    env.nodes.put(node.clone());
                }
                env
            },
            |env| {
                runtime.block_on(async {
                    let _ = env.graph.handle(&OrchestrationEvent::start("plan")).await.unwrap();
                    for node in &nodes {
                        let event = OrchestrationEvent::status_update("plan", node.id.clone());
                        black_box(env.graph.handle(&event).await.unwrap());
                    }
                });
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, upsert_benchmark, router_benchmark);
criterion_main!(benches);
