//! Records lifecycle events and republishes them.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::{MutationApplied, OrchestrationEvent};
use crate::errors::GraphResult;
use crate::model::{EventLogPayload, OrchestrationEventLog};
use crate::store::{EventLogStore, EventLogStream};
use crate::utils::now_millis;

/// Persists an event log row for every node or plan update and publishes
/// the same payload on the outbound stream. Start and end are not logged.
pub struct EventLogPublisher {
    store: Arc<dyn EventLogStore>,
    stream: Arc<dyn EventLogStream>,
    ttl: Duration,
}

impl EventLogPublisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(store: Arc<dyn EventLogStore>, stream: Arc<dyn EventLogStream>, ttl: Duration) -> Self {
        Self { store, stream, ttl }
    }

    /// Logs and publishes `event` if its type is logged.
    #[instrument(skip(self, event), fields(plan_execution_id = %event.plan_execution_id(), event_type = %event.event_type()))]
    pub async fn handle(&self, event: &OrchestrationEvent) -> GraphResult<MutationApplied> {
        let event_type = event.event_type();
        if !event_type.is_logged() {
            return Ok(MutationApplied::none());
        }

        let payload = EventLogPayload {
            plan_execution_id: event.plan_execution_id().to_string(),
            node_execution_id: event
                .node_execution_id()
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            event_type,
        };
        self.record(&payload).await?;
        Ok(MutationApplied::applied())
    }

    /// Persists `payload`, then publishes it.
    pub async fn record(&self, payload: &EventLogPayload) -> GraphResult<OrchestrationEventLog> {
        let row = OrchestrationEventLog::from_payload(payload, now_millis(), self.ttl);
        self.store.append(row.clone()).await?;
        self.stream.publish(payload).await?;
        debug!(row_id = %row.id, valid_until = row.valid_until, "Logged orchestration event");
        Ok(row)
    }
}
