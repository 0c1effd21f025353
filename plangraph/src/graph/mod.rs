//! Detail graph maintenance.
//!
//! - [`StartHandler`] creates the cached graph for a plan execution
//! - [`GraphStatusUpdateHelper`] merges node executions into it
//! - [`EndHandler`] copies plan-level status and end time
//! - [`GraphEventHandler`] routes inbound events to the above
//! - [`GraphRepairer`] rebuilds graphs that fell behind the event log

mod end;
mod rebuild;
mod router;
mod start;
mod status_update;


pub use end::EndHandler;
pub use rebuild::GraphRepairer;
pub use router::GraphEventHandler;
pub use start::StartHandler;
pub use status_update::GraphStatusUpdateHelper;

use std::time::Duration;

use crate::errors::GraphResult;
use crate::model::OrchestrationGraph;
use crate::store::GraphCache;

/// Writes `graph` back to the cache with a fresh TTL.
///
/// The cached copy is re-read first: a terminal plan-level status written
/// there concurrently is carried over, and the version is bumped past it.
pub(crate) async fn persist_graph(
    cache: &dyn GraphCache,
    mut graph: OrchestrationGraph,
    ttl: Duration,
) -> GraphResult<OrchestrationGraph> {
    let mut version = graph.cache_version;
    if let Some(current) = cache.get(&graph.plan_execution_id).await? {
        if graph.keep_terminal_from(&current) {
            tracing::debug!(
                plan_execution_id = %graph.plan_execution_id,
                status = %graph.status,
                "Kept terminal status written concurrently"
            );
        }
        version = version.max(current.cache_version);
    }
    graph.cache_version = version + 1;
    cache.upsert(&graph, ttl).await?;
    Ok(graph)
}
