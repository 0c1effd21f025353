//! Routes orchestration events to the detail graph handlers.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::core::{MutationApplied, OrchestrationEvent};
use crate::errors::GraphResult;
use crate::graph::{EndHandler, GraphStatusUpdateHelper, StartHandler};
use crate::store::{GraphCache, NodeExecutionStore, OutcomeStore, PlanExecutionStore};

/// Entry point for detail graph maintenance.
///
/// Events of the same plan execution are applied one at a time, so the
/// read-modify-write on the cached graph never loses a concurrent update.
pub struct GraphEventHandler {
    start: StartHandler,
    status: Arc<GraphStatusUpdateHelper>,
    end: EndHandler,
    cache: Arc<dyn GraphCache>,
    plan_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GraphEventHandler {
    /// Wires the handlers over the given stores.
    #[must_use]
    pub fn new(
        plans: Arc<dyn PlanExecutionStore>,
        nodes: Arc<dyn NodeExecutionStore>,
        outcomes: Arc<dyn OutcomeStore>,
        cache: Arc<dyn GraphCache>,
        config: &EngineConfig,
    ) -> Self {
        let ttl = config.graph_cache_ttl();
        Self {
            start: StartHandler::new(plans.clone(), cache.clone(), ttl),
            status: Arc::new(GraphStatusUpdateHelper::new(nodes, outcomes, cache.clone(), ttl)),
            end: EndHandler::new(plans, cache.clone(), ttl),
            cache,
            plan_locks: DashMap::new(),
        }
    }

    /// The status update helper, shared with graph repair.
    #[must_use]
    pub fn status_helper(&self) -> Arc<GraphStatusUpdateHelper> {
        Arc::clone(&self.status)
    }

    /// Applies one event to the cached graph of its plan execution.
    ///
    /// # Errors
    ///
    /// Propagates store failures, and
    /// [`InvalidRequest`](crate::errors::GraphError::InvalidRequest) for a
    /// start event whose plan does not exist.
    #[instrument(skip(self, event), fields(plan_execution_id = %event.plan_execution_id(), event_type = %event.event_type()))]
    pub async fn handle(&self, event: &OrchestrationEvent) -> GraphResult<MutationApplied> {
        let plan_execution_id = event.plan_execution_id();
        let lock = self.lock_for(plan_execution_id);
        let guard = lock.lock().await;

        let result = match event {
            OrchestrationEvent::Start { .. } => self.start.on_start(plan_execution_id).await,
            OrchestrationEvent::StatusUpdate { node_execution_id, .. }
            | OrchestrationEvent::NodeUpdate { node_execution_id, .. }
            | OrchestrationEvent::StepDetailsUpdate { node_execution_id, .. } => {
                self.on_node_event(event, node_execution_id).await
            }
            OrchestrationEvent::PlanStatusUpdate { .. } => {
                self.end.on_plan_status_update(plan_execution_id).await
            }
            OrchestrationEvent::End { .. } => self.end.on_end(plan_execution_id).await,
        };

        drop(guard);
        drop(lock);
        self.release_lock(plan_execution_id);
        result
    }

    async fn on_node_event(
        &self,
        event: &OrchestrationEvent,
        node_execution_id: &str,
    ) -> GraphResult<MutationApplied> {
        if node_execution_id.is_empty() {
            debug!("Event carries no node execution id");
            return Ok(MutationApplied::none());
        }
        let plan_execution_id = event.plan_execution_id();
        let Some(graph) = self.cache.get(plan_execution_id).await? else {
            debug!("No cached graph, nothing to do");
            return Ok(MutationApplied::none());
        };

        let before = graph.cache_version;
        let after = self
            .status
            .handle_event(plan_execution_id, node_execution_id, event.event_type(), graph)
            .await?;
        Ok((after.cache_version != before).into())
    }

    fn lock_for(&self, plan_execution_id: &str) -> Arc<Mutex<()>> {
        self.plan_locks
            .entry(plan_execution_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the lock of a plan once no task holds or waits on it. Both
    /// this check and [`lock_for`](Self::lock_for) run under the map's
    /// shard lock, so a waiter always shares the entry it found.
    fn release_lock(&self, plan_execution_id: &str) {
        self.plan_locks
            .remove_if(plan_execution_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of plans with an event in flight.
    #[must_use]
    pub fn plans_in_flight(&self) -> usize {
        self.plan_locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ambiance, ExecutionStatus, Level, StepCategory};
    use crate::errors::GraphError;
    use crate::model::{NodeExecution, PlanExecution};
    use crate::store::{
        InMemoryGraphCache, InMemoryNodeExecutionStore, InMemoryOutcomeStore, InMemoryPlanExecutionStore,
    };

    struct Fixture {
        plans: Arc<InMemoryPlanExecutionStore>,
        nodes: Arc<InMemoryNodeExecutionStore>,
        cache: Arc<InMemoryGraphCache>,
        handler: GraphEventHandler,
    }

    fn fixture() -> Fixture {
        let plans = Arc::new(InMemoryPlanExecutionStore::new());
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        let cache = Arc::new(InMemoryGraphCache::new());
        let handler = GraphEventHandler::new(
            plans.clone(),
            nodes.clone(),
            Arc::new(InMemoryOutcomeStore::new()),
            cache.clone(),
            &EngineConfig::default(),
        );
        Fixture {
            plans,
            nodes,
            cache,
            handler,
        }
    }

    fn stage(id: &str) -> NodeExecution {
        let ambiance = Ambiance::new("plan").with_level(Level::new(id, id, StepCategory::Stage));
        NodeExecution::new(id, id, ambiance)
    }

    #[tokio::test]
    async fn test_routes_full_lifecycle() {
        let f = fixture();
        f.plans.put(PlanExecution::running("plan", 1));
        f.nodes.put(stage("sA").with_status(ExecutionStatus::Running));

        assert!(f.handler.handle(&OrchestrationEvent::start("plan")).await.unwrap().is_applied());
        assert!(f
            .handler
            .handle(&OrchestrationEvent::status_update("plan", "sA"))
            .await
            .unwrap()
            .is_applied());
        assert!(!f
            .handler
            .handle(&OrchestrationEvent::node_update("plan", "sA"))
            .await
            .unwrap()
            .is_applied());

        f.plans.put(PlanExecution::running("plan", 1).finished(ExecutionStatus::Succeeded, 10));
        assert!(f.handler.handle(&OrchestrationEvent::end("plan")).await.unwrap().is_applied());

        let graph = f.cache.get("plan").await.unwrap().unwrap();
        assert_eq!(graph.root_node_ids, vec!["sA"]);
        assert_eq!(graph.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_node_event_without_graph_is_nothing_to_do() {
        let f = fixture();
        f.nodes.put(stage("sA"));

        let applied = f
            .handler
            .handle(&OrchestrationEvent::status_update("plan", "sA"))
            .await
            .unwrap();
        assert!(!applied.is_applied());
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_empty_node_id_is_a_no_op() {
        let f = fixture();
        f.plans.put(PlanExecution::running("plan", 1));
        let _ = f.handler.handle(&OrchestrationEvent::start("plan")).await.unwrap();

        let applied = f
            .handler
            .handle(&OrchestrationEvent::step_details_update("plan", ""))
            .await
            .unwrap();
        assert!(!applied.is_applied());
    }

    #[tokio::test]
    async fn test_start_for_unknown_plan_propagates() {
        let f = fixture();
        let err = f.handler.handle(&OrchestrationEvent::start("ghost")).await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let f = fixture();
        f.plans.put(PlanExecution::running("plan", 1));
        let _ = f.handler.handle(&OrchestrationEvent::start("plan")).await.unwrap();
        let ids: Vec<String> = (0..16).map(|i| format!("s{i}")).collect();
        for id in &ids {
            f.nodes.put(stage(id));
        }

        let handler = Arc::new(f.handler);
        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let handler = Arc::clone(&handler);
                let event = OrchestrationEvent::status_update("plan", id.clone());
                tokio::spawn(async move { handler.handle(&event).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            let _ = task.unwrap().unwrap();
        }

        let graph = f.cache.get("plan").await.unwrap().unwrap();
        assert_eq!(graph.vertex_count(), 16);
        assert!(graph.unreachable_vertices().is_empty());
        assert_eq!(handler.plans_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_plans_that_never_end_hold_no_lock() {
        let f = fixture();
        for i in 0..32 {
            let plan = format!("plan{i}");
            f.plans.put(PlanExecution::running(plan.clone(), 1));
            let _ = f.handler.handle(&OrchestrationEvent::start(plan.clone())).await.unwrap();
            let _ = f
                .handler
                .handle(&OrchestrationEvent::status_update(plan, "missing"))
                .await
                .unwrap();
        }

        assert_eq!(f.handler.plans_in_flight(), 0);
        assert_eq!(f.cache.len(), 32);
    }

    #[tokio::test]
    async fn test_failed_event_releases_its_lock() {
        let f = fixture();
        assert!(f.handler.handle(&OrchestrationEvent::start("ghost")).await.is_err());
        assert_eq!(f.handler.plans_in_flight(), 0);
    }
}
