//! # Plangraph
//!
//! Incrementally maintained execution graphs for running pipelines.
//!
//! Plangraph consumes orchestration events for a plan execution and keeps
//! two derived views of it current:
//!
//! - **Detail graph**: every node execution as a vertex with child, next
//!   and parent edges, cached with a TTL for UI rendering
//! - **Execution summary**: a stage-level layout, including strategy
//!   fan-out and rollback chaining, plus guarded replica reads
//! - **Event log**: a time-limited record of node and plan updates,
//!   republished to downstream consumers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plangraph::prelude::*;
//!
//! let config = EngineConfig::from_env()?;
//! init_logging(&config.logging);
//!
//! let graph = GraphEventHandler::new(plans, nodes, outcomes, cache, &config);
//! graph.handle(&OrchestrationEvent::start("plan-1")).await?;
//! graph.handle(&OrchestrationEvent::status_update("plan-1", "node-1")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod logging;
pub mod model;
pub mod store;
pub mod summary;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, LoggingConfig, MAX_BATCH_SIZE};
    pub use crate::core::{
        Ambiance, ExecutionStatus, Level, MutationApplied, OrchestrationEvent,
        OrchestrationEventType, StepCategory, StrategyType,
    };
    pub use crate::errors::{GraphError, GraphResult};
    pub use crate::events::EventLogPublisher;
    pub use crate::graph::{
        EndHandler, GraphEventHandler, GraphRepairer, GraphStatusUpdateHelper, StartHandler,
    };
    pub use crate::logging::init_logging;
    pub use crate::model::{
        GraphLayoutNode, NodeExecution, OrchestrationEventLog, OrchestrationGraph,
        PipelineExecutionSummary, PipelineKey, PlanExecution, SummaryUpdate,
    };
    pub use crate::store::{
        EventLogStore, EventLogStream, GraphCache, NodeExecutionStore, OutcomeStore,
        PlanExecutionStore, SpawnedChildrenStore, SummaryFilter, SummaryReplica, SummaryStore,
    };
    pub use crate::summary::{ExecutionSummaryService, SummaryReadHelper, SummaryStreamQuery};
    pub use crate::utils::{now_millis, EpochMillis, RetryPolicy};
}
