//! Assertions over detail graphs and summaries.

use crate::core::ExecutionStatus;
use crate::model::{OrchestrationGraph, PipelineExecutionSummary};

/// Asserts that vertex `id` exists with `expected` status.
pub fn assert_vertex_status(graph: &OrchestrationGraph, id: &str, expected: ExecutionStatus) {
    let vertex = graph
        .vertex(id)
        .unwrap_or_else(|| panic!("Expected vertex '{id}' in graph of {}", graph.plan_execution_id));
    assert_eq!(
        vertex.status, expected,
        "Expected vertex '{id}' to be {expected}, got {}",
        vertex.status
    );
}

/// Asserts that the graph carries a terminal status and an end time.
pub fn assert_graph_finalized(graph: &OrchestrationGraph, expected: ExecutionStatus) {
    assert_eq!(graph.status, expected, "Unexpected plan-level graph status");
    assert!(graph.end_ts.is_some(), "Expected graph end time to be set");
}

/// Asserts that every vertex is reachable from a root.
pub fn assert_all_reachable(graph: &OrchestrationGraph) {
    let orphans = graph.unreachable_vertices();
    assert!(orphans.is_empty(), "Unreachable vertices: {orphans:?}");
}

/// Asserts the `currentNodeChildren` of layout node `key`, ignoring order.
pub fn assert_layout_children(summary: &PipelineExecutionSummary, key: &str, expected: &[&str]) {
    let node = summary
        .layout_node(key)
        .unwrap_or_else(|| panic!("Expected layout node '{key}'"));
    let mut actual: Vec<&str> = node
        .edge_layout_list
        .current_node_children
        .iter()
        .map(String::as_str)
        .collect();
    actual.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected children of '{key}'");
}
