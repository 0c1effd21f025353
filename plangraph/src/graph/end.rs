//! Copies plan-level status onto the cached graph.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::core::MutationApplied;
use crate::errors::GraphResult;
use crate::graph::persist_graph;
use crate::store::{GraphCache, PlanExecutionStore};

/// Handles orchestration end and plan status changes.
pub struct EndHandler {
    plans: Arc<dyn PlanExecutionStore>,
    cache: Arc<dyn GraphCache>,
    ttl: Duration,
}

impl EndHandler {
    /// Creates an end handler.
    #[must_use]
    pub fn new(plans: Arc<dyn PlanExecutionStore>, cache: Arc<dyn GraphCache>, ttl: Duration) -> Self {
        Self { plans, cache, ttl }
    }

    /// Sets the graph's status and end time from the finished plan.
    ///
    /// Independent of vertex state. A missing graph or plan is logged and
    /// skipped.
    #[instrument(skip(self))]
    pub async fn on_end(&self, plan_execution_id: &str) -> GraphResult<MutationApplied> {
        let Some(plan) = self.plans.get(plan_execution_id).await? else {
            info!("Plan execution not found, nothing to finalize");
            return Ok(MutationApplied::none());
        };
        let Some(mut graph) = self.cache.get(plan_execution_id).await? else {
            info!("No cached graph, nothing to finalize");
            return Ok(MutationApplied::none());
        };

        let unchanged = graph.status == plan.status && graph.end_ts == plan.end_ts;
        if unchanged || (graph.is_finalized() && !plan.status.is_terminal()) {
            return Ok(MutationApplied::none());
        }
        graph.finalize(plan.status, plan.end_ts);
        persist_graph(self.cache.as_ref(), graph, self.ttl).await?;
        info!(status = %plan.status, end_ts = ?plan.end_ts, "Finalized orchestration graph");
        Ok(MutationApplied::applied())
    }

    /// Refreshes the graph's status from the plan without ever replacing a
    /// terminal status with a non-terminal one.
    #[instrument(skip(self))]
    pub async fn on_plan_status_update(&self, plan_execution_id: &str) -> GraphResult<MutationApplied> {
        let Some(plan) = self.plans.get(plan_execution_id).await? else {
            return Ok(MutationApplied::none());
        };
        let Some(mut graph) = self.cache.get(plan_execution_id).await? else {
            return Ok(MutationApplied::none());
        };

        if graph.status == plan.status || (graph.is_finalized() && !plan.status.is_terminal()) {
            debug!(graph_status = %graph.status, plan_status = %plan.status, "Plan status not applied");
            return Ok(MutationApplied::none());
        }
        graph.status = plan.status;
        if plan.status.is_terminal() {
            graph.end_ts = plan.end_ts;
        }
        persist_graph(self.cache.as_ref(), graph, self.ttl).await?;
        Ok(MutationApplied::applied())
    }
}
