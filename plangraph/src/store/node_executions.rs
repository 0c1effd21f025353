//! Node execution arena.
//!
//! Node executions reference each other by id (parent, previous sibling,
//! retried attempts). The store resolves those references through explicit
//! index tables instead of embedding records inside each other.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;

use crate::errors::GraphResult;
use crate::model::NodeExecution;

/// Read access to node executions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeExecutionStore: Send + Sync {
    /// Point lookup by node execution id.
    async fn get(&self, node_execution_id: &str) -> GraphResult<Option<NodeExecution>>;

    /// Every node execution of a plan, ordered by start time then id.
    async fn list_by_plan(&self, plan_execution_id: &str) -> GraphResult<Vec<NodeExecution>>;

    /// Node executions whose parent is `parent_id`.
    async fn children_of(&self, parent_id: &str) -> GraphResult<Vec<NodeExecution>>;

    /// Stage and stage-level strategy executions of a plan.
    ///
    /// Backends may project these records down to the fields the summary
    /// needs; callers must not rely on outcome or step detail fields.
    async fn fetch_stage_executions(&self, plan_execution_id: &str) -> GraphResult<Vec<NodeExecution>>;
}

/// In-memory node execution arena.
#[derive(Debug, Default)]
pub struct InMemoryNodeExecutionStore {
    nodes: DashMap<String, NodeExecution>,
    by_plan: DashMap<String, BTreeSet<String>>,
    by_parent: DashMap<String, BTreeSet<String>>,
    next_of: DashMap<String, String>,
}

impl InMemoryNodeExecutionStore {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a node execution and refreshes the indexes.
    pub fn put(&self, node: NodeExecution) {
        if let Some((_, previous)) = self.nodes.remove(&node.id) {
            if let Some(parent) = &previous.parent_id {
                if let Some(mut siblings) = self.by_parent.get_mut(parent) {
                    siblings.remove(&previous.id);
                }
            }
            if let Some(prev) = &previous.previous_id {
                self.next_of.remove_if(prev, |_, next| next == &previous.id);
            }
        }

        self.by_plan
            .entry(node.plan_execution_id().to_string())
            .or_default()
            .insert(node.id.clone());
        if let Some(parent) = &node.parent_id {
            self.by_parent
                .entry(parent.clone())
                .or_default()
                .insert(node.id.clone());
        }
        if let Some(prev) = &node.previous_id {
            self.next_of.insert(prev.clone(), node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// The node execution that follows `node_execution_id` in its chain.
    #[must_use]
    pub fn next_of(&self, node_execution_id: &str) -> Option<String> {
        self.next_of.get(node_execution_id).map(|next| next.clone())
    }

    /// Number of stored node executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn collect(&self, ids: impl IntoIterator<Item = String>) -> Vec<NodeExecution> {
        let mut found: Vec<NodeExecution> = ids
            .into_iter()
            .filter_map(|id| self.nodes.get(&id).map(|node| node.clone()))
            .collect();
        found.sort_by(|a, b| a.start_ts.cmp(&b.start_ts).then_with(|| a.id.cmp(&b.id)));
        found
    }

    fn ids_in_plan(&self, plan_execution_id: &str) -> Vec<String> {
        self.by_plan
            .get(plan_execution_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NodeExecutionStore for InMemoryNodeExecutionStore {
    async fn get(&self, node_execution_id: &str) -> GraphResult<Option<NodeExecution>> {
        Ok(self.nodes.get(node_execution_id).map(|node| node.clone()))
    }

    async fn list_by_plan(&self, plan_execution_id: &str) -> GraphResult<Vec<NodeExecution>> {
        Ok(self.collect(self.ids_in_plan(plan_execution_id)))
    }

    async fn children_of(&self, parent_id: &str) -> GraphResult<Vec<NodeExecution>> {
        let ids: Vec<String> = self
            .by_parent
            .get(parent_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        Ok(self.collect(ids))
    }

    async fn fetch_stage_executions(&self, plan_execution_id: &str) -> GraphResult<Vec<NodeExecution>> {
        let mut nodes = self.collect(self.ids_in_plan(plan_execution_id));
        nodes.retain(|node| node.ambiance.is_stage_or_stage_strategy());
        Ok(nodes)
    }
}
