//! Creates the cached graph when a plan execution starts.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::core::MutationApplied;
use crate::errors::{GraphResult, InvalidRequestError};
use crate::graph::persist_graph;
use crate::model::OrchestrationGraph;
use crate::store::{GraphCache, PlanExecutionStore};

/// Handles orchestration start.
pub struct StartHandler {
    plans: Arc<dyn PlanExecutionStore>,
    cache: Arc<dyn GraphCache>,
    ttl: Duration,
}

impl StartHandler {
    /// Creates a start handler.
    #[must_use]
    pub fn new(plans: Arc<dyn PlanExecutionStore>, cache: Arc<dyn GraphCache>, ttl: Duration) -> Self {
        Self { plans, cache, ttl }
    }

    /// Stores an empty running graph for the plan.
    ///
    /// A redelivered start leaves an existing graph in place.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if the plan execution does not exist.
    #[instrument(skip(self))]
    pub async fn on_start(&self, plan_execution_id: &str) -> GraphResult<MutationApplied> {
        let plan = self
            .plans
            .get(plan_execution_id)
            .await?
            .ok_or_else(|| InvalidRequestError::plan_not_found(plan_execution_id))?;

        if self.cache.get(plan_execution_id).await?.is_some() {
            info!("Graph already exists, keeping it");
            return Ok(MutationApplied::none());
        }

        let graph = OrchestrationGraph::new(plan.id, plan.start_ts);
        persist_graph(self.cache.as_ref(), graph, self.ttl).await?;
        info!(start_ts = plan.start_ts, "Created orchestration graph");
        Ok(MutationApplied::applied())
    }
}
