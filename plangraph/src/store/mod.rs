//! Store interfaces consumed and produced by the engine.
//!
//! Each store is an `async_trait` interface injected as `Arc<dyn Trait>`,
//! paired with an in-memory implementation used by tests and embedders.
//! Persistent backends live outside this crate.

mod event_log;
mod graph_cache;
mod node_executions;
mod plan_executions;
mod spawned_children;
mod summary;

pub use event_log::{
    CollectingEventLogStream, EventLogStore, EventLogStream, InMemoryEventLogStore,
    LoggingEventLogStream, NoOpEventLogStream,
};
pub use graph_cache::{CachedGraph, GraphCache, InMemoryGraphCache};
pub use node_executions::{InMemoryNodeExecutionStore, NodeExecutionStore};
pub use plan_executions::{
    InMemoryOutcomeStore, InMemoryPlanExecutionStore, OutcomeStore, PlanExecutionStore,
};
pub use spawned_children::{InMemorySpawnedChildrenStore, SpawnedChildrenStore};
pub use summary::{
    project, DeleteAck, InMemorySummaryStore, SummaryFilter, SummaryReplica, SummaryStore,
};

#[cfg(test)]
pub use event_log::{MockEventLogStore, MockEventLogStream};
#[cfg(test)]
pub use node_executions::MockNodeExecutionStore;
#[cfg(test)]
pub use plan_executions::{MockOutcomeStore, MockPlanExecutionStore};
#[cfg(test)]
pub use spawned_children::MockSpawnedChildrenStore;
#[cfg(test)]
pub use summary::{MockSummaryReplica, MockSummaryStore};
