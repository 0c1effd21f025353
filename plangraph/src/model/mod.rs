//! Documents read and written by the engine.
//!
//! - Node and plan executions (inputs)
//! - The detail graph (cached)
//! - The stage-level summary and its field-path updates
//! - Event log rows

mod event_log;
mod graph;
mod node_execution;
mod summary;

pub use event_log::{EventLogPayload, OrchestrationEventLog};
pub use graph::{EdgeList, GraphVertex, OrchestrationAdjacencyList, OrchestrationGraph};
pub use node_execution::{
    ChildSpawn, ExecutableResponse, FailureInfo, InterruptEffect, NodeExecution, PlanExecution,
    SkipInfo, SpawnedChildren, PIPELINE_ROLLBACK_STEP_TYPE,
};
pub use summary::{
    EdgeLayoutList, GraphLayoutNode, LayoutField, PipelineExecutionSummary, PipelineKey, PlanField,
    SummaryOp, SummaryUpdate,
};
