//! Records of children actually spawned by strategies.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::errors::GraphResult;
use crate::model::SpawnedChildren;

/// Read access to spawned-children records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpawnedChildrenStore: Send + Sync {
    /// The record for a strategy node execution, if it spawned anything yet.
    async fn get(&self, strategy_execution_id: &str) -> GraphResult<Option<SpawnedChildren>>;
}

/// Thread-safe in-memory tracker of spawned children.
#[derive(Debug, Default)]
pub struct InMemorySpawnedChildrenStore {
    records: RwLock<HashMap<String, SpawnedChildren>>,
}

impl InMemorySpawnedChildrenStore {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `strategy_execution_id` spawned `child_id`.
    pub fn register(&self, strategy_execution_id: &str, child_id: &str, max_concurrency: Option<u32>) {
        let mut records = self.records.write();
        let record = records
            .entry(strategy_execution_id.to_string())
            .or_insert_with(|| SpawnedChildren::new(strategy_execution_id, max_concurrency));
        if max_concurrency.is_some() {
            record.max_concurrency = max_concurrency;
        }
        record.record(child_id);
    }

    /// Replaces the whole record for a strategy.
    pub fn put(&self, record: SpawnedChildren) {
        self.records.write().insert(record.parent_id.clone(), record);
    }

    /// Returns the number of tracked strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl SpawnedChildrenStore for InMemorySpawnedChildrenStore {
    async fn get(&self, strategy_execution_id: &str) -> GraphResult<Option<SpawnedChildren>> {
        Ok(self.records.read().get(strategy_execution_id).cloned())
    }
}
