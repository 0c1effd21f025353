//! Append-only record of orchestration events.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::OrchestrationEventType;
use crate::utils::{expiry_after, EpochMillis};

/// The payload published for every logged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogPayload {
    /// The plan execution.
    pub plan_execution_id: String,
    /// The node execution, for node-scoped events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_execution_id: Option<String>,
    /// The event type.
    pub event_type: OrchestrationEventType,
}

/// A persisted event log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationEventLog {
    /// Row id.
    pub id: Uuid,
    /// The plan execution.
    pub plan_execution_id: String,
    /// The node execution, for node-scoped events.
    #[serde(default)]
    pub node_execution_id: Option<String>,
    /// The event type.
    pub event_type: OrchestrationEventType,
    /// When the row was written.
    pub created_at: EpochMillis,
    /// When the row becomes eligible for expiry.
    pub valid_until: EpochMillis,
}

impl OrchestrationEventLog {
    /// Builds a row for `payload` created at `now` that lives for `ttl`.
    #[must_use]
    pub fn from_payload(payload: &EventLogPayload, now: EpochMillis, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_execution_id: payload.plan_execution_id.clone(),
            node_execution_id: payload.node_execution_id.clone(),
            event_type: payload.event_type,
            created_at: now,
            valid_until: expiry_after(now, ttl),
        }
    }

    /// Returns true once the row has outlived its TTL.
    #[must_use]
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        now >= self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_payload() {
        let payload = EventLogPayload {
            plan_execution_id: "plan".to_string(),
            node_execution_id: Some("node".to_string()),
            event_type: OrchestrationEventType::NodeExecutionStatusUpdate,
        };
        let row = OrchestrationEventLog::from_payload(&payload, 1_000, Duration::from_secs(1));

        assert_eq!(row.plan_execution_id, "plan");
        assert_eq!(row.valid_until, 2_000);
        assert!(!row.is_expired(1_999));
        assert!(row.is_expired(2_000));
    }

    #[test]
    fn test_payload_omits_missing_node() {
        let payload = EventLogPayload {
            plan_execution_id: "plan".to_string(),
            node_execution_id: None,
            event_type: OrchestrationEventType::PlanExecutionStatusUpdate,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"planExecutionId": "plan", "eventType": "PLAN_EXECUTION_STATUS_UPDATE"})
        );
    }
}
