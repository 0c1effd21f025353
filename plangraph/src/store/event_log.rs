//! Event log persistence and the outbound event stream.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use crate::errors::GraphResult;
use crate::model::{EventLogPayload, OrchestrationEventLog};
use crate::utils::EpochMillis;

/// Storage for event log rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Persists a row.
    async fn append(&self, row: OrchestrationEventLog) -> GraphResult<()>;

    /// Rows of a plan created strictly after `since`, oldest first.
    async fn list_since(
        &self,
        plan_execution_id: &str,
        since: EpochMillis,
    ) -> GraphResult<Vec<OrchestrationEventLog>>;

    /// The newest row of a plan.
    async fn latest(&self, plan_execution_id: &str) -> GraphResult<Option<OrchestrationEventLog>>;

    /// Removes rows whose `valid_until` has passed. Returns how many.
    async fn delete_expired(&self, now: EpochMillis) -> GraphResult<usize>;
}

/// Outbound stream that republishes logged events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLogStream: Send + Sync {
    /// Publishes one payload.
    async fn publish(&self, payload: &EventLogPayload) -> GraphResult<()>;
}

/// In-memory event log.
#[derive(Debug, Default)]
pub struct InMemoryEventLogStore {
    rows: RwLock<Vec<OrchestrationEventLog>>,
}

impl InMemoryEventLogStore {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<OrchestrationEventLog> {
        self.rows.read().clone()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLogStore {
    async fn append(&self, row: OrchestrationEventLog) -> GraphResult<()> {
        self.rows.write().push(row);
        Ok(())
    }

    async fn list_since(
        &self,
        plan_execution_id: &str,
        since: EpochMillis,
    ) -> GraphResult<Vec<OrchestrationEventLog>> {
        let mut found: Vec<_> = self
            .rows
            .read()
            .iter()
            .filter(|row| row.plan_execution_id == plan_execution_id && row.created_at > since)
            .cloned()
            .collect();
        found.sort_by_key(|row| row.created_at);
        Ok(found)
    }

    async fn latest(&self, plan_execution_id: &str) -> GraphResult<Option<OrchestrationEventLog>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| row.plan_execution_id == plan_execution_id)
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn delete_expired(&self, now: EpochMillis) -> GraphResult<usize> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| !row.is_expired(now));
        Ok(before - rows.len())
    }
}

/// A stream that discards every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventLogStream;

#[async_trait]
impl EventLogStream for NoOpEventLogStream {
    async fn publish(&self, _payload: &EventLogPayload) -> GraphResult<()> {
        Ok(())
    }
}

/// A stream that writes payloads to the tracing output.
#[derive(Debug, Clone)]
pub struct LoggingEventLogStream {
    level: Level,
}

impl Default for LoggingEventLogStream {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventLogStream {
    /// Creates a logging stream at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging stream.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl EventLogStream for LoggingEventLogStream {
    async fn publish(&self, payload: &EventLogPayload) -> GraphResult<()> {
        if self.level == Level::DEBUG {
            debug!(
                plan_execution_id = %payload.plan_execution_id,
                node_execution_id = ?payload.node_execution_id,
                event_type = %payload.event_type,
                "Published orchestration event"
            );
        } else {
            info!(
                plan_execution_id = %payload.plan_execution_id,
                node_execution_id = ?payload.node_execution_id,
                event_type = %payload.event_type,
                "Published orchestration event"
            );
        }
        Ok(())
    }
}

/// A stream that keeps every payload, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventLogStream {
    published: RwLock<Vec<EventLogPayload>>,
}

impl CollectingEventLogStream {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All published payloads.
    #[must_use]
    pub fn published(&self) -> Vec<EventLogPayload> {
        self.published.read().clone()
    }

    /// Returns the number of published payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.read().len()
    }

    /// Returns true if nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.published.read().is_empty()
    }

    /// Clears the collector.
    pub fn clear(&self) {
        self.published.write().clear();
    }
}

#[async_trait]
impl EventLogStream for CollectingEventLogStream {
    async fn publish(&self, payload: &EventLogPayload) -> GraphResult<()> {
        self.published.write().push(payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrchestrationEventType;
    use std::time::Duration;

    fn row(plan: &str, created_at: EpochMillis) -> OrchestrationEventLog {
        let payload = EventLogPayload {
            plan_execution_id: plan.to_string(),
            node_execution_id: None,
            event_type: OrchestrationEventType::NodeExecutionUpdate,
        };
        OrchestrationEventLog::from_payload(&payload, created_at, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_list_since_and_latest() {
        let store = InMemoryEventLogStore::new();
        store.append(row("plan", 30)).await.unwrap();
        store.append(row("plan", 10)).await.unwrap();
        store.append(row("other", 50)).await.unwrap();

        let since: Vec<_> = store
            .list_since("plan", 5)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.created_at)
            .collect();
        assert_eq!(since, vec![10, 30]);
        assert!(store.list_since("plan", 30).await.unwrap().is_empty());
        assert_eq!(store.latest("plan").await.unwrap().unwrap().created_at, 30);
        assert!(store.latest("none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let store = InMemoryEventLogStore::new();
        store.append(row("plan", 0)).await.unwrap();
        store.append(row("plan", 500)).await.unwrap();

        assert_eq!(store.delete_expired(200).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_streams() {
        let payload = EventLogPayload {
            plan_execution_id: "plan".to_string(),
            node_execution_id: Some("n1".to_string()),
            event_type: OrchestrationEventType::StepDetailsUpdate,
        };
        NoOpEventLogStream.publish(&payload).await.unwrap();
        LoggingEventLogStream::debug().publish(&payload).await.unwrap();

        let collecting = CollectingEventLogStream::new();
        collecting.publish(&payload).await.unwrap();
        assert_eq!(collecting.published(), vec![payload]);
        collecting.clear();
        assert!(collecting.is_empty());
    }
}
