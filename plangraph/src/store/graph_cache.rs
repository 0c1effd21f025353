//! Cache of detail graphs keyed by plan execution id.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::GraphResult;
use crate::model::OrchestrationGraph;
use crate::utils::{expiry_after, now_millis, EpochMillis};

/// A cached graph with its expiry.
#[derive(Debug, Clone)]
pub struct CachedGraph {
    /// The graph.
    pub graph: OrchestrationGraph,
    /// When the entry expires.
    pub expires_at: EpochMillis,
}

impl CachedGraph {
    /// Wraps `graph` with an expiry `ttl` from now.
    #[must_use]
    pub fn new(graph: OrchestrationGraph, ttl: Duration) -> Self {
        Self {
            graph,
            expires_at: expiry_after(now_millis(), ttl),
        }
    }

    /// Returns true if the entry has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }
}

/// Storage for cached detail graphs.
///
/// There is at most one graph per plan execution id; `upsert` replaces it
/// and refreshes its TTL.
#[async_trait]
pub trait GraphCache: Send + Sync {
    /// Gets the graph for a plan execution, if cached and not expired.
    async fn get(&self, plan_execution_id: &str) -> GraphResult<Option<OrchestrationGraph>>;

    /// Stores the graph under its plan execution id with a fresh TTL.
    async fn upsert(&self, graph: &OrchestrationGraph, ttl: Duration) -> GraphResult<()>;

    /// Removes the graph for a plan execution.
    async fn delete(&self, plan_execution_id: &str) -> GraphResult<()>;
}

/// In-memory graph cache.
#[derive(Debug, Default)]
pub struct InMemoryGraphCache {
    entries: Arc<Mutex<HashMap<String, CachedGraph>>>,
}

impl InMemoryGraphCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|e| !e.is_expired()).count()
    }

    /// Returns true if no live entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry of the entry for a plan execution.
    #[must_use]
    pub fn expires_at(&self, plan_execution_id: &str) -> Option<EpochMillis> {
        self.entries
            .lock()
            .get(plan_execution_id)
            .map(|entry| entry.expires_at)
    }
}

#[async_trait]
impl GraphCache for InMemoryGraphCache {
    async fn get(&self, plan_execution_id: &str) -> GraphResult<Option<OrchestrationGraph>> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(plan_execution_id) {
            if entry.is_expired() {
                entries.remove(plan_execution_id);
                return Ok(None);
            }
            return Ok(Some(entry.graph.clone()));
        }

        Ok(None)
    }

    async fn upsert(&self, graph: &OrchestrationGraph, ttl: Duration) -> GraphResult<()> {
        self.entries.lock().insert(
            graph.plan_execution_id.clone(),
            CachedGraph::new(graph.clone(), ttl),
        );
        Ok(())
    }

    async fn delete(&self, plan_execution_id: &str) -> GraphResult<()> {
        self.entries.lock().remove(plan_execution_id);
        Ok(())
    }
}
