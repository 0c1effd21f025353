//! Rebuilds detail graphs that fell behind the event log.
//!
//! A graph can miss events when its cache write failed or the entry
//! expired mid-run. The event log records every node-scoped event, so a
//! logged node whose current record the graph does not hold marks it
//! stale. Log rows carry write times and vertices carry node modification
//! times, so the two are never compared directly.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::core::MutationApplied;
use crate::errors::GraphResult;
use crate::graph::{persist_graph, GraphStatusUpdateHelper};
use crate::model::OrchestrationGraph;
use crate::store::{EventLogStore, GraphCache, NodeExecutionStore, PlanExecutionStore};
use crate::utils::EpochMillis;

/// Detects and repairs stale cached graphs.
pub struct GraphRepairer {
    plans: Arc<dyn PlanExecutionStore>,
    nodes: Arc<dyn NodeExecutionStore>,
    event_log: Arc<dyn EventLogStore>,
    cache: Arc<dyn GraphCache>,
    status: Arc<GraphStatusUpdateHelper>,
    ttl: Duration,
}

impl GraphRepairer {
    /// Creates a repairer.
    #[must_use]
    pub fn new(
        plans: Arc<dyn PlanExecutionStore>,
        nodes: Arc<dyn NodeExecutionStore>,
        event_log: Arc<dyn EventLogStore>,
        cache: Arc<dyn GraphCache>,
        status: Arc<GraphStatusUpdateHelper>,
        ttl: Duration,
    ) -> Self {
        Self {
            plans,
            nodes,
            event_log,
            cache,
            status,
            ttl,
        }
    }

    /// Returns true if the event log names a node or plan change the
    /// cached graph has not absorbed, or holds events for a plan with no
    /// cached graph.
    #[instrument(skip(self))]
    pub async fn is_stale(&self, plan_execution_id: &str) -> GraphResult<bool> {
        let Some(graph) = self.cache.get(plan_execution_id).await? else {
            return Ok(self.event_log.latest(plan_execution_id).await?.is_some());
        };

        let rows = self.event_log.list_since(plan_execution_id, EpochMillis::MIN).await?;
        let mut checked = BTreeSet::new();
        let mut plan_checked = false;
        for row in rows {
            let missed = match row.node_execution_id {
                Some(node_execution_id) => {
                    if !checked.insert(node_execution_id.clone()) {
                        continue;
                    }
                    self.node_missed(&graph, &node_execution_id).await?
                }
                None => {
                    if std::mem::replace(&mut plan_checked, true) {
                        continue;
                    }
                    self.plan_missed(&graph).await?
                }
            };
            if missed {
                debug!(row_id = %row.id, event_type = %row.event_type, "Graph missed a logged event");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn node_missed(&self, graph: &OrchestrationGraph, node_execution_id: &str) -> GraphResult<bool> {
        Ok(match self.nodes.get(node_execution_id).await? {
            Some(node) => !graph.reflects(&node),
            None => false,
        })
    }

    async fn plan_missed(&self, graph: &OrchestrationGraph) -> GraphResult<bool> {
        Ok(match self.plans.get(&graph.plan_execution_id).await? {
            Some(plan) => {
                plan.status != graph.status && !(graph.is_finalized() && !plan.status.is_terminal())
            }
            None => false,
        })
    }

    /// Replays every node execution of the plan into a fresh graph and
    /// replaces the cached one.
    #[instrument(skip(self))]
    pub async fn rebuild(&self, plan_execution_id: &str) -> GraphResult<Option<OrchestrationGraph>> {
        let Some(plan) = self.plans.get(plan_execution_id).await? else {
            info!("Plan execution not found, nothing to rebuild");
            return Ok(None);
        };

        let mut graph = OrchestrationGraph::new(plan.id.clone(), plan.start_ts);
        let nodes = self.nodes.list_by_plan(plan_execution_id).await?;
        for node in &nodes {
            self.status.apply_node(plan_execution_id, node, &mut graph).await?;
        }
        if plan.status.is_terminal() {
            graph.finalize(plan.status, plan.end_ts);
        } else {
            graph.status = plan.status;
        }

        let graph = persist_graph(self.cache.as_ref(), graph, self.ttl).await?;
        info!(vertices = graph.vertex_count(), version = graph.cache_version, "Rebuilt orchestration graph");
        Ok(Some(graph))
    }

    /// Rebuilds the graph only when [`is_stale`](Self::is_stale) says so.
    pub async fn repair_if_stale(&self, plan_execution_id: &str) -> GraphResult<MutationApplied> {
        if !self.is_stale(plan_execution_id).await? {
            return Ok(MutationApplied::none());
        }
        Ok(self.rebuild(plan_execution_id).await?.is_some().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ambiance, ExecutionStatus, Level, OrchestrationEventType, StepCategory};
    use crate::model::{EventLogPayload, GraphVertex, NodeExecution, OrchestrationEventLog, PlanExecution};
    use crate::store::{
        InMemoryEventLogStore, InMemoryGraphCache, InMemoryNodeExecutionStore, InMemoryOutcomeStore,
        InMemoryPlanExecutionStore,
    };
    use crate::utils::now_millis;
    use std::collections::BTreeMap;

    const TTL: Duration = Duration::from_secs(60);

    struct Fixture {
        plans: Arc<InMemoryPlanExecutionStore>,
        nodes: Arc<InMemoryNodeExecutionStore>,
        log: Arc<InMemoryEventLogStore>,
        cache: Arc<InMemoryGraphCache>,
        repairer: GraphRepairer,
    }

    fn fixture() -> Fixture {
        let plans = Arc::new(InMemoryPlanExecutionStore::new());
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        let log = Arc::new(InMemoryEventLogStore::new());
        let cache = Arc::new(InMemoryGraphCache::new());
        let status = Arc::new(GraphStatusUpdateHelper::new(
            nodes.clone(),
            Arc::new(InMemoryOutcomeStore::new()),
            cache.clone(),
            TTL,
        ));
        let repairer = GraphRepairer::new(plans.clone(), nodes.clone(), log.clone(), cache.clone(), status, TTL);
        Fixture {
            plans,
            nodes,
            log,
            cache,
            repairer,
        }
    }

    fn node(id: &str, parent: Option<&str>, updated: i64) -> NodeExecution {
        let ambiance = Ambiance::new("plan").with_level(Level::new(id, id, StepCategory::Step));
        let node = NodeExecution::new(id, id, ambiance).with_last_updated_at(updated);
        match parent {
            Some(parent) => node.with_parent(parent),
            None => node,
        }
    }

    async fn log_event(log: &InMemoryEventLogStore, node: &str, at: i64) {
        let payload = EventLogPayload {
            plan_execution_id: "plan".to_string(),
            node_execution_id: Some(node.to_string()),
            event_type: OrchestrationEventType::NodeExecutionStatusUpdate,
        };
        log.append(OrchestrationEventLog::from_payload(&payload, at, TTL)).await.unwrap();
    }

    async fn cache_graph_of(f: &Fixture, nodes: &[&NodeExecution]) {
        let mut graph = OrchestrationGraph::new("plan", 1);
        for node in nodes {
            graph.upsert_vertex(node, GraphVertex::from_node_execution(node, BTreeMap::new()));
        }
        f.cache.upsert(&graph, TTL).await.unwrap();
    }

    #[tokio::test]
    async fn test_graph_holding_every_logged_node_is_not_stale() {
        let f = fixture();
        assert!(!f.repairer.is_stale("plan").await.unwrap());

        let stage = node("stage", None, now_millis() - 5);
        f.nodes.put(stage.clone());
        cache_graph_of(&f, &[&stage]).await;
        log_event(&f.log, "stage", now_millis()).await;
        log_event(&f.log, "stage", now_millis() + 1).await;
        log_event(&f.log, "deleted", now_millis() + 2).await;

        assert!(!f.repairer.is_stale("plan").await.unwrap());
    }

    #[tokio::test]
    async fn test_missed_node_update_is_stale() {
        let f = fixture();
        let stage = node("stage", None, 10);
        f.nodes.put(stage.clone());
        cache_graph_of(&f, &[&stage]).await;
        log_event(&f.log, "stage", 5).await;
        assert!(!f.repairer.is_stale("plan").await.unwrap());

        f.nodes.put(stage.with_status(ExecutionStatus::Succeeded).with_last_updated_at(11));
        log_event(&f.log, "stage", 12).await;
        assert!(f.repairer.is_stale("plan").await.unwrap());
    }

    #[tokio::test]
    async fn test_missed_plan_status_is_stale() {
        let f = fixture();
        f.plans.put(PlanExecution::running("plan", 1));
        cache_graph_of(&f, &[]).await;
        let payload = EventLogPayload {
            plan_execution_id: "plan".to_string(),
            node_execution_id: None,
            event_type: OrchestrationEventType::PlanExecutionStatusUpdate,
        };
        f.log.append(OrchestrationEventLog::from_payload(&payload, 3, TTL)).await.unwrap();
        assert!(!f.repairer.is_stale("plan").await.unwrap());

        f.plans.put(PlanExecution::running("plan", 1).finished(ExecutionStatus::Failed, 9));
        assert!(f.repairer.is_stale("plan").await.unwrap());
        assert!(f.repairer.repair_if_stale("plan").await.unwrap().is_applied());
        assert_eq!(f.cache.get("plan").await.unwrap().unwrap().status, ExecutionStatus::Failed);
        assert!(!f.repairer.is_stale("plan").await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_replays_history() {
        let f = fixture();
        f.plans.put(PlanExecution::running("plan", 1).finished(ExecutionStatus::Succeeded, 50));
        f.nodes.put(node("stage", None, 10));
        f.nodes.put(node("step", Some("stage"), 20));
        log_event(&f.log, "step", 30).await;

        let applied = f.repairer.repair_if_stale("plan").await.unwrap();
        assert!(applied.is_applied());

        let graph = f.cache.get("plan").await.unwrap().unwrap();
        assert_eq!(graph.root_node_ids, vec!["stage"]);
        assert_eq!(graph.edge_list("stage").unwrap().edges, vec!["step"]);
        assert_eq!(graph.status, ExecutionStatus::Succeeded);
        assert!(!f.repairer.is_stale("plan").await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_unknown_plan() {
        let f = fixture();
        assert!(f.repairer.rebuild("ghost").await.unwrap().is_none());
    }
}
