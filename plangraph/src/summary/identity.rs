//! Bulk replay of identity executions.
//!
//! A rerun from a later stage replays the earlier stages as identity nodes.
//! They arrive together and in no useful order, so one identity event
//! re-derives every identity stage and strategy of the plan at once.

use tracing::debug;

use crate::errors::GraphResult;
use crate::model::SummaryUpdate;
use crate::summary::service::stage_update;
use crate::summary::ExecutionSummaryService;

impl ExecutionSummaryService {
    /// Re-derives summary entries from all identity stage and strategy
    /// executions of the plan. Strategies are reconciled first so their
    /// children have entries before the stage fields land on them.
    pub async fn replay_identity_nodes(&self, plan_execution_id: &str) -> GraphResult<bool> {
        let identity: Vec<_> = self
            .nodes
            .fetch_stage_executions(plan_execution_id)
            .await?
            .into_iter()
            .filter(|node| node.is_identity())
            .collect();
        if identity.is_empty() {
            return Ok(false);
        }

        let (strategies, stages): (Vec<_>, Vec<_>) = identity
            .into_iter()
            .partition(|node| node.ambiance.is_strategy_at_stage_level());

        let mut changed = false;
        for strategy in &strategies {
            changed |= self.reconcile_strategy(plan_execution_id, strategy).await?;
        }

        let mut update = SummaryUpdate::new();
        for stage in stages.iter().filter(|node| node.is_stage()) {
            update.extend(stage_update(stage));
        }
        debug!(
            strategies = strategies.len(),
            stages = stages.len(),
            "Replaying identity executions"
        );
        if !update.is_empty() {
            changed |= self.summaries.update(plan_execution_id, update).await?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ambiance, ExecutionStatus, Level, StepCategory};
    use crate::model::{
        EdgeLayoutList, GraphLayoutNode, NodeExecution, PipelineExecutionSummary, PipelineKey,
    };
    use crate::store::{
        InMemoryNodeExecutionStore, InMemoryPlanExecutionStore, InMemorySpawnedChildrenStore,
        InMemorySummaryStore, MockNodeExecutionStore, MockSummaryStore,
    };
    use std::sync::Arc;

    fn summary() -> PipelineExecutionSummary {
        PipelineExecutionSummary::new(PipelineKey::new("acc", "org", "proj", "pipe"), "plan")
            .with_layout_node("sA", GraphLayoutNode::default())
            .with_layout_node("sB", GraphLayoutNode::default())
            .with_layout_node(
                "strat1",
                GraphLayoutNode {
                    edge_layout_list: EdgeLayoutList::new(vec!["tmpl1".to_string()], vec![]),
                    ..Default::default()
                },
            )
            .with_layout_node(
                "tmpl1",
                GraphLayoutNode {
                    node_type: "Deployment".to_string(),
                    module: Some("cd".to_string()),
                    ..Default::default()
                },
            )
    }

    fn stage(id: &str, template: &str) -> NodeExecution {
        let ambiance = Ambiance::new("plan").with_level(Level::new(template, id, StepCategory::Stage));
        NodeExecution::new(id, template, ambiance)
            .with_status(ExecutionStatus::Succeeded)
            .with_times(Some(1), Some(2))
    }

    #[tokio::test]
    async fn test_replays_identity_stages_in_one_write() {
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        nodes.put(stage("a", "sA").as_identity_of("old-a"));
        nodes.put(stage("b", "sB").as_identity_of("old-b"));
        nodes.put(stage("c", "sC"));
        let summaries = Arc::new(InMemorySummaryStore::new());
        summaries.insert(summary());
        let service = ExecutionSummaryService::new(
            nodes,
            Arc::new(InMemoryPlanExecutionStore::new()),
            Arc::new(InMemorySpawnedChildrenStore::new()),
            summaries.clone(),
        );

        assert!(service.replay_identity_nodes("plan").await.unwrap());

        assert_eq!(summaries.writes().len(), 1);
        let doc = summaries.snapshot("plan").unwrap();
        assert_eq!(doc.layout_node("sA").unwrap().node_execution_id.as_deref(), Some("a"));
        assert_eq!(doc.layout_node("sB").unwrap().status, ExecutionStatus::Succeeded);
        assert!(doc.layout_node("sC").is_none());
    }

    #[tokio::test]
    async fn test_identity_strategy_reconciled_before_stages() {
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        let strat_ambiance =
            Ambiance::new("plan").with_level(Level::new("strat1", "s-1", StepCategory::Strategy));
        nodes.put(NodeExecution::new("s-1", "strat1", strat_ambiance.clone()).as_identity_of("old-s-1"));
        let child = NodeExecution::new(
            "c1",
            "tmpl1",
            strat_ambiance.with_level(Level::new("tmpl1", "c1", StepCategory::Stage)),
        )
        .with_parent("s-1")
        .with_status(ExecutionStatus::Succeeded)
        .as_identity_of("old-c1");
        nodes.put(child);

        let summaries = Arc::new(InMemorySummaryStore::new());
        summaries.insert(summary());
        let service = ExecutionSummaryService::new(
            nodes,
            Arc::new(InMemoryPlanExecutionStore::new()),
            Arc::new(InMemorySpawnedChildrenStore::new()),
            summaries.clone(),
        );

        assert!(service.replay_identity_nodes("plan").await.unwrap());

        let writes = summaries.writes();
        assert_eq!(writes.len(), 3);
        assert!(writes[2].1.paths().contains(&"layoutNodeMap.c1.status".to_string()));
        let doc = summaries.snapshot("plan").unwrap();
        let c1 = doc.layout_node("c1").unwrap();
        assert!(c1.is_populated());
        assert_eq!(c1.status, ExecutionStatus::Succeeded);
        assert_eq!(
            doc.layout_node("strat1").unwrap().edge_layout_list.current_node_children,
            vec!["c1"]
        );
    }

    #[tokio::test]
    async fn test_no_identity_nodes_writes_nothing() {
        let mut nodes = MockNodeExecutionStore::new();
        nodes
            .expect_fetch_stage_executions()
            .times(1)
            .returning(|_| Ok(vec![stage("c", "sC")]));
        let mut summaries = MockSummaryStore::new();
        summaries.expect_update().never();
        let service = ExecutionSummaryService::new(
            Arc::new(nodes),
            Arc::new(InMemoryPlanExecutionStore::new()),
            Arc::new(InMemorySpawnedChildrenStore::new()),
            Arc::new(summaries),
        );

        assert!(!service.replay_identity_nodes("plan").await.unwrap());
    }
}
