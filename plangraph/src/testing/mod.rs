//! Testing utilities for plangraph.
//!
//! This module provides:
//! - An in-memory wiring of every handler
//! - Node execution and summary builders
//! - Assertions over graphs and summaries

mod assertions;
mod fixtures;

pub use assertions::{
    assert_all_reachable, assert_graph_finalized, assert_layout_children, assert_vertex_status,
};
pub use fixtures::{
    stage, stage_strategy, step, strategy_child, summary_with_placeholder, Dispatched, TestEnv,
};
