//! Inbound orchestration events and the outcome of handling them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type tag of an orchestration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationEventType {
    /// A plan execution started.
    OrchestrationStart,
    /// A node execution changed status.
    NodeExecutionStatusUpdate,
    /// A node execution changed something other than status.
    NodeExecutionUpdate,
    /// Step details were attached to a node execution.
    StepDetailsUpdate,
    /// A plan execution changed status.
    PlanExecutionStatusUpdate,
    /// A plan execution finished.
    OrchestrationEnd,
}

impl fmt::Display for OrchestrationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OrchestrationStart => "ORCHESTRATION_START",
            Self::NodeExecutionStatusUpdate => "NODE_EXECUTION_STATUS_UPDATE",
            Self::NodeExecutionUpdate => "NODE_EXECUTION_UPDATE",
            Self::StepDetailsUpdate => "STEP_DETAILS_UPDATE",
            Self::PlanExecutionStatusUpdate => "PLAN_EXECUTION_STATUS_UPDATE",
            Self::OrchestrationEnd => "ORCHESTRATION_END",
        };
        write!(f, "{s}")
    }
}

impl OrchestrationEventType {
    /// Returns true for the event types recorded in the event log.
    #[must_use]
    pub fn is_logged(&self) -> bool {
        matches!(
            self,
            Self::NodeExecutionStatusUpdate
                | Self::NodeExecutionUpdate
                | Self::StepDetailsUpdate
                | Self::PlanExecutionStatusUpdate
        )
    }
}

/// An event delivered by the orchestration engine.
///
/// Delivery is at-least-once and unordered across variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum OrchestrationEvent {
    /// A plan execution started.
    Start {
        /// The plan execution.
        plan_execution_id: String,
    },
    /// A node execution changed status.
    StatusUpdate {
        /// The owning plan execution.
        plan_execution_id: String,
        /// The node execution. May be empty on malformed events.
        #[serde(default)]
        node_execution_id: String,
    },
    /// A node execution changed something other than status.
    NodeUpdate {
        /// The owning plan execution.
        plan_execution_id: String,
        /// The node execution.
        #[serde(default)]
        node_execution_id: String,
    },
    /// Step details were attached to a node execution.
    StepDetailsUpdate {
        /// The owning plan execution.
        plan_execution_id: String,
        /// The node execution.
        #[serde(default)]
        node_execution_id: String,
    },
    /// A plan execution changed status.
    PlanStatusUpdate {
        /// The plan execution.
        plan_execution_id: String,
    },
    /// A plan execution finished.
    End {
        /// The plan execution.
        plan_execution_id: String,
    },
}

impl OrchestrationEvent {
    /// Creates a start event.
    #[must_use]
    pub fn start(plan_execution_id: impl Into<String>) -> Self {
        Self::Start {
            plan_execution_id: plan_execution_id.into(),
        }
    }

    /// Creates a node status update event.
    #[must_use]
    pub fn status_update(plan_execution_id: impl Into<String>, node_execution_id: impl Into<String>) -> Self {
        Self::StatusUpdate {
            plan_execution_id: plan_execution_id.into(),
            node_execution_id: node_execution_id.into(),
        }
    }

    /// Creates a node update event.
    #[must_use]
    pub fn node_update(plan_execution_id: impl Into<String>, node_execution_id: impl Into<String>) -> Self {
        Self::NodeUpdate {
            plan_execution_id: plan_execution_id.into(),
            node_execution_id: node_execution_id.into(),
        }
    }

    /// Creates a step details update event.
    #[must_use]
    pub fn step_details_update(
        plan_execution_id: impl Into<String>,
        node_execution_id: impl Into<String>,
    ) -> Self {
        Self::StepDetailsUpdate {
            plan_execution_id: plan_execution_id.into(),
            node_execution_id: node_execution_id.into(),
        }
    }

    /// Creates a plan status update event.
    #[must_use]
    pub fn plan_status_update(plan_execution_id: impl Into<String>) -> Self {
        Self::PlanStatusUpdate {
            plan_execution_id: plan_execution_id.into(),
        }
    }

    /// Creates an end event.
    #[must_use]
    pub fn end(plan_execution_id: impl Into<String>) -> Self {
        Self::End {
            plan_execution_id: plan_execution_id.into(),
        }
    }

    /// Returns the plan execution the event belongs to.
    #[must_use]
    pub fn plan_execution_id(&self) -> &str {
        match self {
            Self::Start { plan_execution_id }
            | Self::StatusUpdate { plan_execution_id, .. }
            | Self::NodeUpdate { plan_execution_id, .. }
            | Self::StepDetailsUpdate { plan_execution_id, .. }
            | Self::PlanStatusUpdate { plan_execution_id }
            | Self::End { plan_execution_id } => plan_execution_id,
        }
    }

    /// Returns the node execution id for node-scoped events.
    #[must_use]
    pub fn node_execution_id(&self) -> Option<&str> {
        match self {
            Self::StatusUpdate { node_execution_id, .. }
            | Self::NodeUpdate { node_execution_id, .. }
            | Self::StepDetailsUpdate { node_execution_id, .. } => Some(node_execution_id),
            _ => None,
        }
    }

    /// Returns the event's type tag.
    #[must_use]
    pub fn event_type(&self) -> OrchestrationEventType {
        match self {
            Self::Start { .. } => OrchestrationEventType::OrchestrationStart,
            Self::StatusUpdate { .. } => OrchestrationEventType::NodeExecutionStatusUpdate,
            Self::NodeUpdate { .. } => OrchestrationEventType::NodeExecutionUpdate,
            Self::StepDetailsUpdate { .. } => OrchestrationEventType::StepDetailsUpdate,
            Self::PlanStatusUpdate { .. } => OrchestrationEventType::PlanExecutionStatusUpdate,
            Self::End { .. } => OrchestrationEventType::OrchestrationEnd,
        }
    }
}

/// Whether handling an event changed any persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[must_use]
pub struct MutationApplied(bool);

impl MutationApplied {
    /// State was written.
    pub const fn applied() -> Self {
        Self(true)
    }

    /// Nothing was written.
    pub const fn none() -> Self {
        Self(false)
    }

    /// Returns true if state was written.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        self.0
    }
}

impl From<bool> for MutationApplied {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = OrchestrationEvent::status_update("plan", "node");
        assert_eq!(event.plan_execution_id(), "plan");
        assert_eq!(event.node_execution_id(), Some("node"));
        assert_eq!(event.event_type(), OrchestrationEventType::NodeExecutionStatusUpdate);

        let end = OrchestrationEvent::end("plan");
        assert_eq!(end.node_execution_id(), None);
        assert_eq!(end.event_type().to_string(), "ORCHESTRATION_END");
    }

    #[test]
    fn test_event_wire_format() {
        let event = OrchestrationEvent::node_update("p1", "n1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "NODE_UPDATE", "planExecutionId": "p1", "nodeExecutionId": "n1"})
        );

        let parsed: OrchestrationEvent =
            serde_json::from_str(r#"{"type":"STATUS_UPDATE","planExecutionId":"p1"}"#).unwrap();
        assert_eq!(parsed.node_execution_id(), Some(""));
    }

    #[test]
    fn test_logged_event_types() {
        assert!(OrchestrationEventType::NodeExecutionStatusUpdate.is_logged());
        assert!(OrchestrationEventType::PlanExecutionStatusUpdate.is_logged());
        assert!(!OrchestrationEventType::OrchestrationStart.is_logged());
        assert!(!OrchestrationEventType::OrchestrationEnd.is_logged());
    }

    #[test]
    fn test_mutation_applied() {
        assert!(MutationApplied::applied().is_applied());
        assert!(!MutationApplied::none().is_applied());
        assert_eq!(MutationApplied::from(true), MutationApplied::applied());
    }
}
