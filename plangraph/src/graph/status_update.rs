//! Applies one node execution's change to a cached detail graph.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::OrchestrationEventType;
use crate::errors::GraphResult;
use crate::graph::persist_graph;
use crate::model::{GraphVertex, NodeExecution, OrchestrationGraph};
use crate::store::{GraphCache, NodeExecutionStore, OutcomeStore};

/// Derives vertices from node executions and merges them into the graph.
pub struct GraphStatusUpdateHelper {
    nodes: Arc<dyn NodeExecutionStore>,
    outcomes: Arc<dyn OutcomeStore>,
    cache: Arc<dyn GraphCache>,
    ttl: Duration,
}

impl GraphStatusUpdateHelper {
    /// Creates a helper.
    #[must_use]
    pub fn new(
        nodes: Arc<dyn NodeExecutionStore>,
        outcomes: Arc<dyn OutcomeStore>,
        cache: Arc<dyn GraphCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            nodes,
            outcomes,
            cache,
            ttl,
        }
    }

    /// Applies the node execution `node_execution_id` to `cached_graph`
    /// and persists the result when it changed.
    ///
    /// A redelivered event that changes nothing rewrites the graph as is,
    /// which refreshes its TTL without bumping `cache_version`.
    ///
    /// An empty `node_execution_id` returns the graph untouched without
    /// reading any store. A node execution that no longer exists also
    /// leaves the graph untouched.
    #[instrument(skip(self, event_type, cached_graph), fields(event_type = %event_type))]
    pub async fn handle_event(
        &self,
        plan_execution_id: &str,
        node_execution_id: &str,
        event_type: OrchestrationEventType,
        cached_graph: OrchestrationGraph,
    ) -> GraphResult<OrchestrationGraph> {
        if node_execution_id.is_empty() {
            return Ok(cached_graph);
        }
        let Some(node) = self.nodes.get(node_execution_id).await? else {
            debug!(node_execution_id, "Node execution not found, graph unchanged");
            return Ok(cached_graph);
        };

        let mut graph = cached_graph;
        if self.apply_node(plan_execution_id, &node, &mut graph).await? {
            return persist_graph(self.cache.as_ref(), graph, self.ttl).await;
        }
        self.cache.upsert(&graph, self.ttl).await?;
        Ok(graph)
    }

    /// Merges an already loaded node execution into `graph`.
    pub async fn apply_node(
        &self,
        plan_execution_id: &str,
        node: &NodeExecution,
        graph: &mut OrchestrationGraph,
    ) -> GraphResult<bool> {
        let outcomes = self.outcomes.fetch_outcomes(plan_execution_id, &node.id).await?;
        let vertex = GraphVertex::from_node_execution(node, outcomes);
        let changed = graph.upsert_vertex(node, vertex);
        debug!(
            node_execution_id = %node.id,
            status = %node.status,
            changed,
            vertices = graph.vertex_count(),
            "Applied node execution to graph"
        );
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ambiance, ExecutionStatus, Level, StepCategory};
    use crate::store::{
        InMemoryGraphCache, InMemoryNodeExecutionStore, InMemoryOutcomeStore, MockNodeExecutionStore,
        MockOutcomeStore,
    };
    use pretty_assertions::assert_eq;

    const TTL: Duration = Duration::from_secs(60);

    fn stage(id: &str) -> NodeExecution {
        let ambiance = Ambiance::new("plan").with_level(Level::new("tmpl", id, StepCategory::Stage));
        NodeExecution::new(id, "tmpl", ambiance).with_identifier("build")
    }

    fn helper(
        nodes: Arc<InMemoryNodeExecutionStore>,
        outcomes: Arc<InMemoryOutcomeStore>,
        cache: Arc<InMemoryGraphCache>,
    ) -> GraphStatusUpdateHelper {
        GraphStatusUpdateHelper::new(nodes, outcomes, cache, TTL)
    }

    #[tokio::test]
    async fn test_empty_node_id_touches_no_store() {
        let mut nodes = MockNodeExecutionStore::new();
        nodes.expect_get().never();
        let mut outcomes = MockOutcomeStore::new();
        outcomes.expect_fetch_outcomes().never();
        let cache = Arc::new(InMemoryGraphCache::new());
        let helper = GraphStatusUpdateHelper::new(Arc::new(nodes), Arc::new(outcomes), cache.clone(), TTL);

        let graph = OrchestrationGraph::new("plan", 1);
        let result = helper
            .handle_event("plan", "", OrchestrationEventType::NodeExecutionStatusUpdate, graph.clone())
            .await
            .unwrap();

        assert_eq!(result, graph);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_missing_node_leaves_graph_unchanged() {
        let cache = Arc::new(InMemoryGraphCache::new());
        let helper = helper(
            Arc::new(InMemoryNodeExecutionStore::new()),
            Arc::new(InMemoryOutcomeStore::new()),
            cache.clone(),
        );

        let graph = OrchestrationGraph::new("plan", 1);
        let result = helper
            .handle_event("plan", "ghost", OrchestrationEventType::NodeExecutionUpdate, graph.clone())
            .await
            .unwrap();
        assert_eq!(result, graph);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_vertex_carries_outcomes_and_is_persisted() {
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        nodes.put(stage("sA").with_status(ExecutionStatus::Running));
        let outcomes = Arc::new(InMemoryOutcomeStore::new());
        outcomes.put("plan", "sA", "artifact", serde_json::json!({"tag": "v1"}));
        let cache = Arc::new(InMemoryGraphCache::new());
        let helper = helper(nodes, outcomes, cache.clone());

        let result = helper
            .handle_event(
                "plan",
                "sA",
                OrchestrationEventType::NodeExecutionStatusUpdate,
                OrchestrationGraph::new("plan", 1),
            )
            .await
            .unwrap();

        let vertex = result.vertex("sA").unwrap();
        assert_eq!(vertex.status, ExecutionStatus::Running);
        assert_eq!(vertex.outcomes["artifact"]["tag"], "v1");
        assert_eq!(result.cache_version, 1);
        assert_eq!(cache.get("plan").await.unwrap(), Some(result));
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        nodes.put(stage("sA").with_status(ExecutionStatus::Succeeded));
        let cache = Arc::new(InMemoryGraphCache::new());
        let helper = helper(nodes, Arc::new(InMemoryOutcomeStore::new()), cache);

        let once = helper
            .handle_event(
                "plan",
                "sA",
                OrchestrationEventType::NodeExecutionStatusUpdate,
                OrchestrationGraph::new("plan", 1),
            )
            .await
            .unwrap();
        let twice = helper
            .handle_event("plan", "sA", OrchestrationEventType::NodeExecutionStatusUpdate, once.clone())
            .await
            .unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_redelivery_refreshes_ttl_without_new_version() {
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        nodes.put(stage("sA").with_status(ExecutionStatus::Running));
        let outcomes = Arc::new(InMemoryOutcomeStore::new());
        let cache = Arc::new(InMemoryGraphCache::new());
        let short = helper(nodes.clone(), outcomes.clone(), cache.clone());
        let long = GraphStatusUpdateHelper::new(nodes, outcomes, cache.clone(), TTL * 10);

        let once = short
            .handle_event(
                "plan",
                "sA",
                OrchestrationEventType::NodeExecutionStatusUpdate,
                OrchestrationGraph::new("plan", 1),
            )
            .await
            .unwrap();
        let first_expiry = cache.expires_at("plan").unwrap();

        let again = long
            .handle_event("plan", "sA", OrchestrationEventType::NodeExecutionStatusUpdate, once.clone())
            .await
            .unwrap();

        assert_eq!(again.cache_version, once.cache_version);
        assert!(cache.expires_at("plan").unwrap() > first_expiry);
        assert_eq!(cache.get("plan").await.unwrap(), Some(once));
    }
}
