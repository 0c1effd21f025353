//! Maintains the stage-level summary of each plan execution.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::core::{MutationApplied, OrchestrationEvent};
use crate::errors::{GraphError, GraphResult, SummaryDeletionError};
use crate::model::{LayoutField, NodeExecution, PipelineKey, PlanField, SummaryUpdate};
use crate::store::{NodeExecutionStore, PlanExecutionStore, SpawnedChildrenStore, SummaryStore};
use crate::utils::{with_retry, RetryPolicy};

/// Keeps `layoutNodeMap` entries for stages and stage-level strategies in
/// step with their node executions.
pub struct ExecutionSummaryService {
    pub(super) nodes: Arc<dyn NodeExecutionStore>,
    pub(super) plans: Arc<dyn PlanExecutionStore>,
    pub(super) spawned: Arc<dyn SpawnedChildrenStore>,
    pub(super) summaries: Arc<dyn SummaryStore>,
    delete_retry: RetryPolicy,
}

impl ExecutionSummaryService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        nodes: Arc<dyn NodeExecutionStore>,
        plans: Arc<dyn PlanExecutionStore>,
        spawned: Arc<dyn SpawnedChildrenStore>,
        summaries: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            nodes,
            plans,
            spawned,
            summaries,
            delete_retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy for bulk deletion.
    #[must_use]
    pub fn with_delete_retry(mut self, policy: RetryPolicy) -> Self {
        self.delete_retry = policy;
        self
    }

    /// Applies one orchestration event to the summary.
    #[instrument(skip(self, event), fields(plan_execution_id = %event.plan_execution_id(), event_type = %event.event_type()))]
    pub async fn handle(&self, event: &OrchestrationEvent) -> GraphResult<MutationApplied> {
        let plan_execution_id = event.plan_execution_id();
        match event {
            OrchestrationEvent::Start { .. } => Ok(MutationApplied::none()),
            OrchestrationEvent::StatusUpdate { node_execution_id, .. }
            | OrchestrationEvent::NodeUpdate { node_execution_id, .. }
            | OrchestrationEvent::StepDetailsUpdate { node_execution_id, .. } => {
                if node_execution_id.is_empty() {
                    return Ok(MutationApplied::none());
                }
                let Some(node) = self.nodes.get(node_execution_id).await? else {
                    debug!(%node_execution_id, "Node execution not found");
                    return Ok(MutationApplied::none());
                };
                let changed = self
                    .handle_node_execution_update_from_graph_update(plan_execution_id, &[node])
                    .await?;
                Ok(changed.into())
            }
            OrchestrationEvent::PlanStatusUpdate { .. } | OrchestrationEvent::End { .. } => {
                Ok(self.update_plan_fields(plan_execution_id).await?.into())
            }
        }
    }

    /// Applies node execution updates, in order.
    ///
    /// For each node: strategy reconciliation, identity replay, rollback
    /// linkage, then the generic stage update. Returns true if any write
    /// changed the summary.
    pub async fn handle_node_execution_update_from_graph_update(
        &self,
        plan_execution_id: &str,
        nodes: &[NodeExecution],
    ) -> GraphResult<bool> {
        let mut changed = false;
        for node in nodes {
            if node.ambiance.is_strategy_at_stage_level() {
                changed |= self.reconcile_strategy(plan_execution_id, node).await?;
            }
            if node.is_identity() && node.ambiance.is_stage_or_stage_strategy() {
                changed |= self.replay_identity_nodes(plan_execution_id).await?;
            }
            if node.is_pipeline_rollback_stage() {
                changed |= self.link_rollback_stage(plan_execution_id, node).await?;
            }
            if node.is_stage() {
                let update = stage_update(node);
                changed |= self.summaries.update(plan_execution_id, update).await?;
            }
        }
        Ok(changed)
    }

    /// Chains a rollback stage after the stage whose failure triggered it.
    ///
    /// The trigger is the failed stage execution of the plan that ended
    /// last. Its `nextIds` is replaced with the rollback stage's key.
    pub async fn link_rollback_stage(
        &self,
        plan_execution_id: &str,
        rollback: &NodeExecution,
    ) -> GraphResult<bool> {
        let stages = self.nodes.fetch_stage_executions(plan_execution_id).await?;
        let trigger = stages
            .iter()
            .filter(|stage| {
                stage.is_stage() && stage.status.is_failure() && !stage.is_pipeline_rollback_stage()
            })
            .max_by_key(|stage| stage.end_ts);
        let Some(trigger) = trigger else {
            debug!(rollback = %rollback.id, "No failed stage to chain rollback after");
            return Ok(false);
        };

        let mut update = SummaryUpdate::new();
        update.set(
            layout_key(trigger),
            LayoutField::NextIds(vec![layout_key(rollback)]),
        );
        self.summaries.update(plan_execution_id, update).await
    }

    /// Copies plan-level status and times onto the summary. A terminal
    /// status is never replaced by a non-terminal one.
    pub async fn update_plan_fields(&self, plan_execution_id: &str) -> GraphResult<bool> {
        let Some(plan) = self.plans.get(plan_execution_id).await? else {
            return Ok(false);
        };
        if let Some(summary) = self.summaries.find(plan_execution_id).await? {
            if summary.status.is_terminal() && !plan.status.is_terminal() {
                return Ok(false);
            }
        }

        let mut update = SummaryUpdate::new();
        update
            .set_plan(PlanField::Status(plan.status))
            .set_plan(PlanField::StartTs(Some(plan.start_ts)))
            .set_plan(PlanField::EndTs(plan.end_ts));
        self.summaries.update(plan_execution_id, update).await
    }

    /// Removes every summary of a deleted pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SummaryDeletion`] when the store never
    /// acknowledged the delete within the retry policy.
    #[instrument(skip(self), fields(pipeline = %key.pipeline_identifier))]
    pub async fn delete_summaries_for_pipeline(&self, key: &PipelineKey) -> GraphResult<u64> {
        let deleted = with_retry(&self.delete_retry, "delete_summaries", GraphError::is_retriable, |attempt| {
            let summaries = Arc::clone(&self.summaries);
            let key = key.clone();
            async move {
                let ack = summaries.delete_by_pipeline(&key).await?;
                if ack.acknowledged {
                    Ok(ack.deleted_count)
                } else {
                    Err(GraphError::from(SummaryDeletionError::new(
                        key.pipeline_identifier,
                        attempt + 1,
                    )))
                }
            }
        })
        .await?;
        info!(deleted, "Deleted execution summaries");
        Ok(deleted)
    }
}

/// Layout key of a stage or strategy: its template id, or its own node
/// execution id when iterations of a strategy share the template.
pub(super) fn layout_key(node: &NodeExecution) -> String {
    if node.ambiance.is_under_strategy() {
        node.id.clone()
    } else {
        node.node_id.clone()
    }
}

/// Field writes for an ordinary stage update.
pub(super) fn stage_update(node: &NodeExecution) -> SummaryUpdate {
    let key = layout_key(node);
    let mut update = SummaryUpdate::new();
    update
        .set(key.clone(), LayoutField::Status(node.status))
        .set(key.clone(), LayoutField::StartTs(node.start_ts))
        .set(key.clone(), LayoutField::EndTs(node.end_ts))
        .set(key.clone(), LayoutField::NodeExecutionId(node.id.clone()))
        .set(key.clone(), LayoutField::FailureInfo(node.failure_info.clone()));
    if node.ambiance.is_under_strategy() {
        update
            .set(key.clone(), LayoutField::NodeIdentifier(node.identifier.clone()))
            .set(key, LayoutField::Name(node.name.clone()));
    }
    update
}
