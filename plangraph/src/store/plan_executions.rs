//! Plan executions and node outcome documents.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::errors::GraphResult;
use crate::model::PlanExecution;

/// Read access to plan executions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanExecutionStore: Send + Sync {
    /// Point lookup by plan execution id.
    async fn get(&self, plan_execution_id: &str) -> GraphResult<Option<PlanExecution>>;
}

/// Read access to the outcome documents a node published.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Outcomes of one node execution, keyed by outcome name.
    async fn fetch_outcomes(
        &self,
        plan_execution_id: &str,
        node_execution_id: &str,
    ) -> GraphResult<BTreeMap<String, serde_json::Value>>;
}

/// In-memory plan execution store.
#[derive(Debug, Default)]
pub struct InMemoryPlanExecutionStore {
    plans: RwLock<HashMap<String, PlanExecution>>,
}

impl InMemoryPlanExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a plan execution.
    pub fn put(&self, plan: PlanExecution) {
        self.plans.write().insert(plan.id.clone(), plan);
    }
}

#[async_trait]
impl PlanExecutionStore for InMemoryPlanExecutionStore {
    async fn get(&self, plan_execution_id: &str) -> GraphResult<Option<PlanExecution>> {
        Ok(self.plans.read().get(plan_execution_id).cloned())
    }
}

/// In-memory outcome store.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeStore {
    outcomes: RwLock<HashMap<(String, String), BTreeMap<String, serde_json::Value>>>,
}

impl InMemoryOutcomeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome document for a node execution.
    pub fn put(
        &self,
        plan_execution_id: &str,
        node_execution_id: &str,
        name: impl Into<String>,
        outcome: serde_json::Value,
    ) {
        self.outcomes
            .write()
            .entry((plan_execution_id.to_string(), node_execution_id.to_string()))
            .or_default()
            .insert(name.into(), outcome);
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn fetch_outcomes(
        &self,
        plan_execution_id: &str,
        node_execution_id: &str,
    ) -> GraphResult<BTreeMap<String, serde_json::Value>> {
        let key = (plan_execution_id.to_string(), node_execution_id.to_string());
        Ok(self.outcomes.read().get(&key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_store() {
        let store = InMemoryPlanExecutionStore::new();
        store.put(PlanExecution::running("plan", 7));

        assert_eq!(store.get("plan").await.unwrap().unwrap().start_ts, 7);
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outcomes_are_scoped_to_node() {
        let store = InMemoryOutcomeStore::new();
        store.put("plan", "n1", "output", serde_json::json!({"artifact": "img:1"}));

        let found = store.fetch_outcomes("plan", "n1").await.unwrap();
        assert_eq!(found["output"]["artifact"], "img:1");
        assert!(store.fetch_outcomes("plan", "n2").await.unwrap().is_empty());
    }
}
