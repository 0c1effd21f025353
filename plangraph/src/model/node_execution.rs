//! Node and plan execution records produced by the orchestration engine.
//!
//! These are read-only inputs. Retry and previous-sibling back-references
//! are plain ids; resolving them goes through a
//! [`NodeExecutionStore`](crate::store::NodeExecutionStore) arena.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{
    Ambiance, ExecutionKind, ExecutionMode, ExecutionStatus, StepCategory, StrategyMetadata,
    StrategyType,
};
use crate::utils::EpochMillis;

/// Why a node failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    /// Human readable message.
    pub error_message: String,
    /// Failure classes, e.g. `TIMEOUT_ERROR`.
    #[serde(default)]
    pub failure_types: Vec<String>,
}

impl FailureInfo {
    /// Creates failure info with a message.
    #[must_use]
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            failure_types: Vec::new(),
        }
    }
}

/// Why a node was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SkipInfo {
    /// The condition expression.
    pub skip_condition: String,
    /// What the condition evaluated to.
    pub evaluated_condition: bool,
}

/// A pause, resume, retry or abort that touched a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptEffect {
    /// The interrupt.
    pub interrupt_id: String,
    /// The interrupt type, e.g. `RETRY`.
    pub interrupt_type: String,
    /// When it took effect.
    pub took_effect_at: EpochMillis,
}

/// A child a strategy or fork declared it would spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSpawn {
    /// Plan node id the child runs.
    pub child_node_id: String,
    /// Iteration coordinates when spawned by a strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_metadata: Option<StrategyMetadata>,
}

/// How a node handed control to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ExecutableResponse {
    /// Ran inline.
    Sync,
    /// Waiting on callbacks.
    Async {
        /// Callback ids being awaited.
        callback_ids: Vec<String>,
    },
    /// Spawned a single child.
    Child {
        /// Plan node id of the child.
        child_node_id: String,
    },
    /// Spawned several children.
    Children {
        /// The declared children.
        children: Vec<ChildSpawn>,
        /// Declared max concurrency, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_concurrency: Option<u32>,
    },
}

/// One invocation of a node inside a plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    /// Node execution id.
    pub id: String,
    /// Nesting path.
    pub ambiance: Ambiance,
    /// Plan node (template/setup) id.
    pub node_id: String,
    /// User-facing identifier.
    #[serde(default)]
    pub identifier: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Enclosing node execution.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Preceding sibling in a sequential chain.
    #[serde(default)]
    pub previous_id: Option<String>,
    /// Earlier attempts this execution replaces.
    #[serde(default)]
    pub retry_ids: Vec<String>,
    /// Current status.
    pub status: ExecutionStatus,
    /// Start time.
    #[serde(default)]
    pub start_ts: Option<EpochMillis>,
    /// End time.
    #[serde(default)]
    pub end_ts: Option<EpochMillis>,
    /// Orchestration mode.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Step type, e.g. `Deployment`, `STRATEGY`, `PipelineRollback`.
    #[serde(default)]
    pub step_type: String,
    /// Hierarchy category.
    #[serde(default)]
    pub step_category: StepCategory,
    /// Resolved step parameters.
    #[serde(default)]
    pub resolved_step_parameters: Option<serde_json::Value>,
    /// Failure details.
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    /// Skip details.
    #[serde(default)]
    pub skip_info: Option<SkipInfo>,
    /// How the node handed control back.
    #[serde(default)]
    pub executable_response: Option<ExecutableResponse>,
    /// Standard or identity.
    #[serde(default)]
    pub kind: ExecutionKind,
    /// For identity nodes, the execution whose result is reused.
    #[serde(default)]
    pub original_node_execution_id: Option<String>,
    /// Named step detail documents.
    #[serde(default)]
    pub step_details: BTreeMap<String, serde_json::Value>,
    /// Interrupts that affected this node.
    #[serde(default)]
    pub interrupt_histories: Vec<InterruptEffect>,
    /// Store modification marker.
    #[serde(default)]
    pub last_updated_at: EpochMillis,
}

/// Step type of pipeline rollback stages.
pub const PIPELINE_ROLLBACK_STEP_TYPE: &str = "PipelineRollback";

impl NodeExecution {
    /// Creates a queued node execution.
    #[must_use]
    pub fn new(id: impl Into<String>, node_id: impl Into<String>, ambiance: Ambiance) -> Self {
        let step_category = ambiance
            .current_level()
            .map_or(StepCategory::Step, |level| level.group);
        Self {
            id: id.into(),
            node_id: node_id.into(),
            ambiance,
            status: ExecutionStatus::Queued,
            step_category,
            ..Default::default()
        }
    }

    /// The owning plan execution.
    #[must_use]
    pub fn plan_execution_id(&self) -> &str {
        &self.ambiance.plan_execution_id
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets identifier and name together.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        self.name.clone_from(&identifier);
        self.identifier = identifier;
        self
    }

    /// Sets the parent.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the previous sibling.
    #[must_use]
    pub fn with_previous(mut self, previous_id: impl Into<String>) -> Self {
        self.previous_id = Some(previous_id.into());
        self
    }

    /// Sets start and end times.
    #[must_use]
    pub fn with_times(mut self, start_ts: Option<EpochMillis>, end_ts: Option<EpochMillis>) -> Self {
        self.start_ts = start_ts;
        self.end_ts = end_ts;
        self
    }

    /// Sets the step type.
    #[must_use]
    pub fn with_step_type(mut self, step_type: impl Into<String>) -> Self {
        self.step_type = step_type.into();
        self
    }

    /// Sets resolved step parameters.
    #[must_use]
    pub fn with_step_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.resolved_step_parameters = Some(parameters);
        self
    }

    /// Sets the executable response.
    #[must_use]
    pub fn with_executable_response(mut self, response: ExecutableResponse) -> Self {
        self.executable_response = Some(response);
        self
    }

    /// Marks this execution as an identity replay of `original_id`.
    #[must_use]
    pub fn as_identity_of(mut self, original_id: impl Into<String>) -> Self {
        self.kind = ExecutionKind::Identity;
        self.original_node_execution_id = Some(original_id.into());
        self
    }

    /// Sets the update marker.
    #[must_use]
    pub fn with_last_updated_at(mut self, last_updated_at: EpochMillis) -> Self {
        self.last_updated_at = last_updated_at;
        self
    }

    /// Returns true for strategy nodes.
    #[must_use]
    pub fn is_strategy(&self) -> bool {
        self.step_category == StepCategory::Strategy
    }

    /// Returns true for stage nodes.
    #[must_use]
    pub fn is_stage(&self) -> bool {
        self.step_category == StepCategory::Stage
    }

    /// Returns true for identity replays.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.kind == ExecutionKind::Identity
    }

    /// Returns true for pipeline rollback stages.
    #[must_use]
    pub fn is_pipeline_rollback_stage(&self) -> bool {
        self.is_stage() && self.step_type == PIPELINE_ROLLBACK_STEP_TYPE
    }

    /// The strategy flavor, read from resolved step parameters.
    #[must_use]
    pub fn strategy_type(&self) -> Option<StrategyType> {
        self.resolved_step_parameters
            .as_ref()?
            .get("strategyType")?
            .as_str()
            .and_then(StrategyType::parse)
    }

    /// Max concurrency declared in the executable response.
    #[must_use]
    pub fn declared_max_concurrency(&self) -> Option<u32> {
        match &self.executable_response {
            Some(ExecutableResponse::Children { max_concurrency, .. }) => *max_concurrency,
            _ => None,
        }
    }
}

/// One pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExecution {
    /// Plan execution id.
    pub id: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Start time.
    pub start_ts: EpochMillis,
    /// End time, once finished.
    #[serde(default)]
    pub end_ts: Option<EpochMillis>,
}

impl PlanExecution {
    /// Creates a running plan execution.
    #[must_use]
    pub fn running(id: impl Into<String>, start_ts: EpochMillis) -> Self {
        Self {
            id: id.into(),
            status: ExecutionStatus::Running,
            start_ts,
            end_ts: None,
        }
    }

    /// Marks the plan finished.
    #[must_use]
    pub fn finished(mut self, status: ExecutionStatus, end_ts: EpochMillis) -> Self {
        self.status = status;
        self.end_ts = Some(end_ts);
        self
    }
}

/// Children a strategy has actually spawned so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedChildren {
    /// The strategy node execution.
    pub parent_id: String,
    /// Node execution ids of the spawned children.
    pub children_ids: Vec<String>,
    /// Declared max concurrency.
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

impl SpawnedChildren {
    /// Creates an empty record.
    #[must_use]
    pub fn new(parent_id: impl Into<String>, max_concurrency: Option<u32>) -> Self {
        Self {
            parent_id: parent_id.into(),
            children_ids: Vec::new(),
            max_concurrency,
        }
    }

    /// Records a spawned child; repeats are ignored.
    pub fn record(&mut self, child_id: impl Into<String>) {
        let child_id = child_id.into();
        if !self.children_ids.contains(&child_id) {
            self.children_ids.push(child_id);
        }
    }
}
