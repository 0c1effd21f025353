//! Strategy fan-out reconciliation.
//!
//! A matrix, loop or parallelism strategy around whole stages is laid out
//! with one placeholder child: the stage template it repeats. Once the
//! strategy spawns real iterations, each iteration gets its own layout
//! entry cloned from the placeholder, and the strategy's
//! `currentNodeChildren` switches from the placeholder to the real ids.
//!
//! The switch is two writes. The first pulls the placeholder, the second
//! adds the real ids. A reader between them sees neither.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::core::StrategyType;
use crate::errors::GraphResult;
use crate::model::{LayoutField, NodeExecution, PipelineExecutionSummary, SummaryUpdate};
use crate::summary::service::layout_key;
use crate::summary::ExecutionSummaryService;

/// The two writes of one reconciliation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyWrites {
    /// Clones, strategy fields and placeholder removal.
    pub first: SummaryUpdate,
    /// Set-union of the real child ids.
    pub second: SummaryUpdate,
}

/// Builds the reconciliation writes for `strategy` given the children it
/// has spawned so far and the current summary.
#[must_use]
pub fn strategy_writes(
    strategy: &NodeExecution,
    children: &[NodeExecution],
    max_concurrency: Option<u32>,
    summary: &PipelineExecutionSummary,
) -> StrategyWrites {
    let key = layout_key(strategy);
    let mut first = SummaryUpdate::new();

    if !children.is_empty() && strategy.strategy_type() != Some(StrategyType::Parallelism) {
        if let Some(max) = max_concurrency {
            first.set(
                key.clone(),
                LayoutField::ModuleInfo("maxConcurrency".to_string(), serde_json::json!(max)),
            );
        }
    }

    let mut placeholders = BTreeSet::new();
    for child in children {
        placeholders.insert(child.node_id.clone());
        if summary.layout_node(&child.id).is_some_and(|entry| entry.is_populated()) {
            continue;
        }
        let Some(placeholder) = summary.layout_node(&child.node_id) else {
            warn!(child = %child.id, placeholder = %child.node_id, "Placeholder layout node missing");
            continue;
        };
        first
            .set(child.id.clone(), LayoutField::NodeType(placeholder.node_type.clone()))
            .set(child.id.clone(), LayoutField::NodeGroup(placeholder.node_group.clone()))
            .set(child.id.clone(), LayoutField::NodeUuid(child.node_id.clone()))
            .set(
                child.id.clone(),
                LayoutField::EdgeLayoutList(placeholder.edge_layout_list.clone()),
            )
            .set(child.id.clone(), LayoutField::SkipInfo(placeholder.skip_info.clone()))
            .set(
                child.id.clone(),
                LayoutField::ExecutionInputConfigured(placeholder.execution_input_configured),
            );
        if let Some(module) = &placeholder.module {
            first.set(child.id.clone(), LayoutField::Module(module.clone()));
        }
    }

    first
        .set(key.clone(), LayoutField::NodeExecutionId(strategy.id.clone()))
        .set(key.clone(), LayoutField::Status(strategy.status))
        .set(key.clone(), LayoutField::StartTs(strategy.start_ts))
        .set(key.clone(), LayoutField::EndTs(strategy.end_ts))
        .set(
            key.clone(),
            LayoutField::StepParameters(strategy.resolved_step_parameters.clone()),
        )
        .set(key.clone(), LayoutField::FailureInfo(strategy.failure_info.clone()));
    for placeholder in placeholders {
        first.pull_child(key.clone(), placeholder);
    }

    let mut second = SummaryUpdate::new();
    if !children.is_empty() {
        second.add_children(key, children.iter().map(|child| child.id.clone()).collect());
    }

    StrategyWrites { first, second }
}

impl ExecutionSummaryService {
    /// Reconciles a stage-level strategy with the children it spawned.
    ///
    /// Returns true if either write changed the summary. Strategies nested
    /// inside a stage are ignored.
    pub async fn reconcile_strategy(
        &self,
        plan_execution_id: &str,
        strategy: &NodeExecution,
    ) -> GraphResult<bool> {
        if !strategy.ambiance.is_strategy_at_stage_level() {
            return Ok(false);
        }
        let Some(summary) = self.summaries.find(plan_execution_id).await? else {
            debug!("No summary for plan, skipping strategy");
            return Ok(false);
        };

        let (children, max_concurrency) = self.spawned_children(strategy).await?;
        let writes = strategy_writes(strategy, &children, max_concurrency, &summary);
        debug!(
            strategy = %strategy.id,
            children = children.len(),
            first_ops = writes.first.len(),
            "Reconciling strategy children"
        );

        let mut changed = self.summaries.update(plan_execution_id, writes.first).await?;
        if !writes.second.is_empty() {
            changed |= self.summaries.update(plan_execution_id, writes.second).await?;
        }
        Ok(changed)
    }

    /// Loads the children a strategy has spawned, with its declared max
    /// concurrency. Identity strategies without a record fall back to the
    /// children recorded under them in the node execution arena.
    async fn spawned_children(
        &self,
        strategy: &NodeExecution,
    ) -> GraphResult<(Vec<NodeExecution>, Option<u32>)> {
        let declared = strategy.declared_max_concurrency();
        let Some(record) = self.spawned.get(&strategy.id).await? else {
            if strategy.is_identity() {
                let children = self.nodes.children_of(&strategy.id).await?;
                return Ok((children, declared));
            }
            return Ok((Vec::new(), declared));
        };

        let mut children = Vec::with_capacity(record.children_ids.len());
        for child_id in &record.children_ids {
            match self.nodes.get(child_id).await? {
                Some(child) => children.push(child),
                None => debug!(%child_id, "Spawned child not yet stored"),
            }
        }
        Ok((children, record.max_concurrency.or(declared)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ambiance, ExecutionStatus, Level, StepCategory};
    use crate::model::{EdgeLayoutList, ExecutableResponse, GraphLayoutNode, PipelineKey, SkipInfo};
    use crate::store::{
        InMemoryNodeExecutionStore, InMemoryPlanExecutionStore, InMemorySpawnedChildrenStore,
        InMemorySummaryStore,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Fixture {
        nodes: Arc<InMemoryNodeExecutionStore>,
        spawned: Arc<InMemorySpawnedChildrenStore>,
        summaries: Arc<InMemorySummaryStore>,
        service: ExecutionSummaryService,
    }

    fn placeholder() -> GraphLayoutNode {
        GraphLayoutNode {
            node_type: "Deployment".to_string(),
            node_group: "STAGE".to_string(),
            node_identifier: "deploy".to_string(),
            node_uuid: "tmpl1".to_string(),
            edge_layout_list: EdgeLayoutList::new(vec![], vec!["sNext".to_string()]),
            skip_info: Some(SkipInfo {
                skip_condition: "<+env> == 'dev'".to_string(),
                evaluated_condition: false,
            }),
            execution_input_configured: true,
            module: Some("cd".to_string()),
            ..Default::default()
        }
    }

    fn fixture() -> Fixture {
        let summaries = Arc::new(InMemorySummaryStore::new());
        summaries.insert(
            PipelineExecutionSummary::new(PipelineKey::new("acc", "org", "proj", "pipe"), "plan")
                .with_layout_node(
                    "strat1",
                    GraphLayoutNode {
                        node_type: "STRATEGY".to_string(),
                        node_group: "STRATEGY".to_string(),
                        edge_layout_list: EdgeLayoutList::new(vec!["tmpl1".to_string()], vec![]),
                        module: Some("pms".to_string()),
                        ..Default::default()
                    },
                )
                .with_layout_node("tmpl1", placeholder()),
        );
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        let spawned = Arc::new(InMemorySpawnedChildrenStore::new());
        let service = ExecutionSummaryService::new(
            nodes.clone(),
            Arc::new(InMemoryPlanExecutionStore::new()),
            spawned.clone(),
            summaries.clone(),
        );
        Fixture {
            nodes,
            spawned,
            summaries,
            service,
        }
    }

    fn strategy(kind: &str) -> NodeExecution {
        let ambiance = Ambiance::new("plan").with_level(Level::new("strat1", "s-1", StepCategory::Strategy));
        NodeExecution::new("s-1", "strat1", ambiance)
            .with_status(ExecutionStatus::Running)
            .with_times(Some(5), None)
            .with_step_parameters(serde_json::json!({"strategyType": kind}))
            .with_executable_response(ExecutableResponse::Children {
                children: vec![],
                max_concurrency: Some(2),
            })
    }

    fn child(id: &str) -> NodeExecution {
        let ambiance = Ambiance::new("plan")
            .with_level(Level::new("strat1", "s-1", StepCategory::Strategy))
            .with_level(Level::new("tmpl1", id, StepCategory::Stage));
        NodeExecution::new(id, "tmpl1", ambiance)
            .with_parent("s-1")
            .with_identifier(format!("deploy_{id}"))
            .with_status(ExecutionStatus::Succeeded)
    }

    fn children_of(summary: &PipelineExecutionSummary, key: &str) -> BTreeSet<String> {
        summary
            .layout_node(key)
            .unwrap()
            .edge_layout_list
            .current_node_children
            .iter()
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_fan_out_replaces_placeholder() {
        let f = fixture();
        for id in ["c1", "c2"] {
            f.nodes.put(child(id));
            f.spawned.register("s-1", id, Some(2));
        }

        assert!(f.service.reconcile_strategy("plan", &strategy("matrix")).await.unwrap());

        let summary = f.summaries.snapshot("plan").unwrap();
        assert_eq!(
            children_of(&summary, "strat1"),
            ["c1", "c2"].iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>()
        );
        for id in ["c1", "c2"] {
            let entry = summary.layout_node(id).unwrap();
            assert!(entry.is_populated());
            assert_eq!(entry.node_uuid, "tmpl1");
            assert_eq!(entry.node_type, "Deployment");
            assert!(entry.execution_input_configured);
            assert_eq!(entry.edge_layout_list.next_ids, vec!["sNext"]);
        }
        let strat = summary.layout_node("strat1").unwrap();
        assert_eq!(strat.module_info["maxConcurrency"], serde_json::json!(2));
        assert_eq!(strat.status, ExecutionStatus::Running);
        assert_eq!(strat.node_execution_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_two_sequential_writes() {
        let f = fixture();
        f.nodes.put(child("c1"));
        f.spawned.register("s-1", "c1", None);

        f.service.reconcile_strategy("plan", &strategy("loop")).await.unwrap();

        let writes = f.summaries.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0]
            .1
            .ops()
            .iter()
            .any(|op| matches!(op, crate::model::SummaryOp::PullChild { child, .. } if child == "tmpl1")));
        assert_eq!(
            writes[1].1.paths(),
            vec!["layoutNodeMap.strat1.edgeLayoutList.currentNodeChildren"]
        );
    }

    #[tokio::test]
    async fn test_incremental_spawns_converge() {
        let f = fixture();
        let strat = strategy("matrix");
        for (n, id) in ["c1", "c2", "c3"].into_iter().enumerate() {
            f.nodes.put(child(id));
            f.spawned.register("s-1", id, Some(2));
            f.service.reconcile_strategy("plan", &strat).await.unwrap();

            let summary = f.summaries.snapshot("plan").unwrap();
            let listed = children_of(&summary, "strat1");
            assert_eq!(listed.len(), n + 1);
            assert!(!listed.contains("tmpl1"));
        }

        assert!(!f.service.reconcile_strategy("plan", &strat).await.unwrap());
    }

    #[tokio::test]
    async fn test_populated_child_is_not_recloned() {
        let f = fixture();
        f.nodes.put(child("c1"));
        f.spawned.register("s-1", "c1", None);
        f.service.reconcile_strategy("plan", &strategy("matrix")).await.unwrap();

        let summary = f.summaries.snapshot("plan").unwrap();
        let writes = strategy_writes(&strategy("matrix"), &[child("c1")], None, &summary);
        assert!(!writes
            .first
            .paths()
            .iter()
            .any(|path| path.starts_with("layoutNodeMap.c1.")));
    }

    #[tokio::test]
    async fn test_parallelism_omits_max_concurrency() {
        let f = fixture();
        f.nodes.put(child("c1"));
        f.spawned.register("s-1", "c1", Some(4));

        f.service.reconcile_strategy("plan", &strategy("parallelism")).await.unwrap();

        let summary = f.summaries.snapshot("plan").unwrap();
        assert!(summary.layout_node("strat1").unwrap().module_info.is_empty());
    }

    #[tokio::test]
    async fn test_no_children_keeps_placeholder() {
        let f = fixture();
        f.service.reconcile_strategy("plan", &strategy("matrix")).await.unwrap();

        let summary = f.summaries.snapshot("plan").unwrap();
        assert_eq!(children_of(&summary, "strat1").len(), 1);
        assert!(summary.layout_node("strat1").unwrap().module_info.is_empty());
        assert_eq!(f.summaries.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_identity_strategy_falls_back_to_arena() {
        let f = fixture();
        f.nodes.put(child("c1"));
        let identity = strategy("matrix").as_identity_of("old-s-1");

        assert!(f.service.reconcile_strategy("plan", &identity).await.unwrap());
        let summary = f.summaries.snapshot("plan").unwrap();
        assert!(children_of(&summary, "strat1").contains("c1"));
    }

    #[tokio::test]
    async fn test_strategy_inside_stage_is_ignored() {
        let f = fixture();
        let ambiance = Ambiance::new("plan")
            .with_level(Level::new("sA", "n1", StepCategory::Stage))
            .with_level(Level::new("stepStrat", "ss", StepCategory::Strategy));
        let nested = NodeExecution::new("ss", "stepStrat", ambiance);

        assert!(!f.service.reconcile_strategy("plan", &nested).await.unwrap());
        assert!(f.summaries.writes().is_empty());
    }
}
