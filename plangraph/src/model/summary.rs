//! The stage-level summary graph and its field-path updates.
//!
//! The summary document is shared by several writers, so it is never
//! rewritten whole. Writers build a [`SummaryUpdate`], an ordered list of
//! operations against `layoutNodeMap.<key>.<field>` paths, and the store
//! applies it in one write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ExecutionStatus;
use crate::model::{FailureInfo, SkipInfo};
use crate::utils::EpochMillis;

/// Edges of a layout node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EdgeLayoutList {
    /// Nodes nested directly inside this one (strategy children).
    pub current_node_children: Vec<String>,
    /// Nodes that follow this one.
    pub next_ids: Vec<String>,
}

impl EdgeLayoutList {
    /// Creates an edge layout.
    #[must_use]
    pub fn new(current_node_children: Vec<String>, next_ids: Vec<String>) -> Self {
        Self {
            current_node_children,
            next_ids,
        }
    }
}

/// Summary-graph node (stage or strategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphLayoutNode {
    /// Node type, e.g. `Deployment` or `STRATEGY`.
    #[serde(default)]
    pub node_type: String,
    /// Node group, e.g. `STAGE` or `STRATEGY`.
    #[serde(default)]
    pub node_group: String,
    /// User-facing identifier.
    #[serde(default)]
    pub node_identifier: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Plan node (template) id.
    #[serde(default)]
    pub node_uuid: String,
    /// The node execution currently backing this entry.
    #[serde(default)]
    pub node_execution_id: Option<String>,
    /// Status.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Start time.
    #[serde(default)]
    pub start_ts: Option<EpochMillis>,
    /// End time.
    #[serde(default)]
    pub end_ts: Option<EpochMillis>,
    /// Edges.
    #[serde(default)]
    pub edge_layout_list: EdgeLayoutList,
    /// Skip details.
    #[serde(default)]
    pub skip_info: Option<SkipInfo>,
    /// Module-specific info, e.g. `maxConcurrency`.
    #[serde(default)]
    pub module_info: BTreeMap<String, serde_json::Value>,
    /// Resolved step parameters.
    #[serde(default)]
    pub step_parameters: Option<serde_json::Value>,
    /// Failure details.
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    /// Whether the stage asks for runtime execution inputs.
    #[serde(default)]
    pub execution_input_configured: bool,
    /// Owning module; present only once the entry is fully populated.
    #[serde(default)]
    pub module: Option<String>,
}

impl GraphLayoutNode {
    /// Returns true once the entry carries its static fields.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.module.is_some()
    }
}

/// Stage-level summary of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecutionSummary {
    /// Account.
    pub account_id: String,
    /// Organization.
    pub org_identifier: String,
    /// Project.
    pub project_identifier: String,
    /// Pipeline definition.
    pub pipeline_identifier: String,
    /// Plan execution.
    pub plan_execution_id: String,
    /// Plan status.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Plan start time.
    #[serde(default)]
    pub start_ts: Option<EpochMillis>,
    /// Plan end time.
    #[serde(default)]
    pub end_ts: Option<EpochMillis>,
    /// Template id or child node execution id to layout node.
    #[serde(default)]
    pub layout_node_map: BTreeMap<String, GraphLayoutNode>,
}

impl PipelineExecutionSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new(key: PipelineKey, plan_execution_id: impl Into<String>) -> Self {
        Self {
            account_id: key.account_id,
            org_identifier: key.org_identifier,
            project_identifier: key.project_identifier,
            pipeline_identifier: key.pipeline_identifier,
            plan_execution_id: plan_execution_id.into(),
            ..Default::default()
        }
    }

    /// Adds a layout node.
    #[must_use]
    pub fn with_layout_node(mut self, key: impl Into<String>, node: GraphLayoutNode) -> Self {
        self.layout_node_map.insert(key.into(), node);
        self
    }

    /// Returns a layout node.
    #[must_use]
    pub fn layout_node(&self, key: &str) -> Option<&GraphLayoutNode> {
        self.layout_node_map.get(key)
    }

    /// Returns true if this summary belongs to the pipeline.
    #[must_use]
    pub fn belongs_to(&self, key: &PipelineKey) -> bool {
        self.account_id == key.account_id
            && self.org_identifier == key.org_identifier
            && self.project_identifier == key.project_identifier
            && self.pipeline_identifier == key.pipeline_identifier
    }
}

/// Identifies a pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineKey {
    /// Account.
    pub account_id: String,
    /// Organization.
    pub org_identifier: String,
    /// Project.
    pub project_identifier: String,
    /// Pipeline definition.
    pub pipeline_identifier: String,
}

impl PipelineKey {
    /// Creates a pipeline key.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        org_identifier: impl Into<String>,
        project_identifier: impl Into<String>,
        pipeline_identifier: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            org_identifier: org_identifier.into(),
            project_identifier: project_identifier.into(),
            pipeline_identifier: pipeline_identifier.into(),
        }
    }
}

/// A single field of a layout node, with the value to write.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutField {
    /// `nodeType`
    NodeType(String),
    /// `nodeGroup`
    NodeGroup(String),
    /// `nodeIdentifier`
    NodeIdentifier(String),
    /// `name`
    Name(String),
    /// `nodeUuid`
    NodeUuid(String),
    /// `nodeExecutionId`
    NodeExecutionId(String),
    /// `status`
    Status(ExecutionStatus),
    /// `startTs`
    StartTs(Option<EpochMillis>),
    /// `endTs`
    EndTs(Option<EpochMillis>),
    /// `edgeLayoutList`
    EdgeLayoutList(EdgeLayoutList),
    /// `edgeLayoutList.nextIds`
    NextIds(Vec<String>),
    /// `skipInfo`
    SkipInfo(Option<SkipInfo>),
    /// `moduleInfo.<key>`
    ModuleInfo(String, serde_json::Value),
    /// `stepParameters`
    StepParameters(Option<serde_json::Value>),
    /// `failureInfo`
    FailureInfo(Option<FailureInfo>),
    /// `executionInputConfigured`
    ExecutionInputConfigured(bool),
    /// `module`
    Module(String),
}

impl LayoutField {
    /// The document path of this field, relative to the layout node.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::NodeType(_) => "nodeType".to_string(),
            Self::NodeGroup(_) => "nodeGroup".to_string(),
            Self::NodeIdentifier(_) => "nodeIdentifier".to_string(),
            Self::Name(_) => "name".to_string(),
            Self::NodeUuid(_) => "nodeUuid".to_string(),
            Self::NodeExecutionId(_) => "nodeExecutionId".to_string(),
            Self::Status(_) => "status".to_string(),
            Self::StartTs(_) => "startTs".to_string(),
            Self::EndTs(_) => "endTs".to_string(),
            Self::EdgeLayoutList(_) => "edgeLayoutList".to_string(),
            Self::NextIds(_) => "edgeLayoutList.nextIds".to_string(),
            Self::SkipInfo(_) => "skipInfo".to_string(),
            Self::ModuleInfo(key, _) => format!("moduleInfo.{key}"),
            Self::StepParameters(_) => "stepParameters".to_string(),
            Self::FailureInfo(_) => "failureInfo".to_string(),
            Self::ExecutionInputConfigured(_) => "executionInputConfigured".to_string(),
            Self::Module(_) => "module".to_string(),
        }
    }

    fn write(self, node: &mut GraphLayoutNode) {
        match self {
            Self::NodeType(v) => node.node_type = v,
            Self::NodeGroup(v) => node.node_group = v,
            Self::NodeIdentifier(v) => node.node_identifier = v,
            Self::Name(v) => node.name = v,
            Self::NodeUuid(v) => node.node_uuid = v,
            Self::NodeExecutionId(v) => node.node_execution_id = Some(v),
            Self::Status(v) => node.status = v,
            Self::StartTs(v) => node.start_ts = v,
            Self::EndTs(v) => node.end_ts = v,
            Self::EdgeLayoutList(v) => node.edge_layout_list = v,
            Self::NextIds(v) => node.edge_layout_list.next_ids = v,
            Self::SkipInfo(v) => node.skip_info = v,
            Self::ModuleInfo(key, v) => {
                node.module_info.insert(key, v);
            }
            Self::StepParameters(v) => node.step_parameters = v,
            Self::FailureInfo(v) => node.failure_info = v,
            Self::ExecutionInputConfigured(v) => node.execution_input_configured = v,
            Self::Module(v) => node.module = Some(v),
        }
    }
}

/// A plan-level field of the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanField {
    /// `status`
    Status(ExecutionStatus),
    /// `startTs`
    StartTs(Option<EpochMillis>),
    /// `endTs`
    EndTs(Option<EpochMillis>),
}

/// One operation of a summary update.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOp {
    /// Set a layout node field, creating the node if absent.
    Set {
        /// Layout node key.
        key: String,
        /// Field and value.
        field: LayoutField,
    },
    /// Remove a value from `currentNodeChildren`.
    PullChild {
        /// Layout node key.
        key: String,
        /// The child id to remove.
        child: String,
    },
    /// Add values to `currentNodeChildren`, skipping ones already present.
    AddChildren {
        /// Layout node key.
        key: String,
        /// The child ids to add.
        children: Vec<String>,
    },
    /// Set a plan-level field.
    SetPlan(PlanField),
}

const CHILDREN_PATH: &str = "edgeLayoutList.currentNodeChildren";

impl SummaryOp {
    /// The document path this operation writes.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Set { key, field } => format!("layoutNodeMap.{key}.{}", field.path()),
            Self::PullChild { key, .. } | Self::AddChildren { key, .. } => {
                format!("layoutNodeMap.{key}.{CHILDREN_PATH}")
            }
            Self::SetPlan(PlanField::Status(_)) => "status".to_string(),
            Self::SetPlan(PlanField::StartTs(_)) => "startTs".to_string(),
            Self::SetPlan(PlanField::EndTs(_)) => "endTs".to_string(),
        }
    }

    fn apply(self, summary: &mut PipelineExecutionSummary) {
        match self {
            Self::Set { key, field } => {
                field.write(summary.layout_node_map.entry(key).or_default());
            }
            Self::PullChild { key, child } => {
                if let Some(node) = summary.layout_node_map.get_mut(&key) {
                    node.edge_layout_list
                        .current_node_children
                        .retain(|existing| existing != &child);
                }
            }
            Self::AddChildren { key, children } => {
                let list = &mut summary
                    .layout_node_map
                    .entry(key)
                    .or_default()
                    .edge_layout_list
                    .current_node_children;
                for child in children {
                    if !list.contains(&child) {
                        list.push(child);
                    }
                }
            }
            Self::SetPlan(PlanField::Status(status)) => summary.status = status,
            Self::SetPlan(PlanField::StartTs(ts)) => summary.start_ts = ts,
            Self::SetPlan(PlanField::EndTs(ts)) => summary.end_ts = ts,
        }
    }
}

/// An ordered batch of operations applied in one store write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryUpdate {
    ops: Vec<SummaryOp>,
}

impl SummaryUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a layout node field.
    pub fn set(&mut self, key: impl Into<String>, field: LayoutField) -> &mut Self {
        self.ops.push(SummaryOp::Set {
            key: key.into(),
            field,
        });
        self
    }

    /// Removes a child from a node's `currentNodeChildren`.
    pub fn pull_child(&mut self, key: impl Into<String>, child: impl Into<String>) -> &mut Self {
        self.ops.push(SummaryOp::PullChild {
            key: key.into(),
            child: child.into(),
        });
        self
    }

    /// Adds children to a node's `currentNodeChildren` as a set union.
    pub fn add_children(&mut self, key: impl Into<String>, children: Vec<String>) -> &mut Self {
        self.ops.push(SummaryOp::AddChildren {
            key: key.into(),
            children,
        });
        self
    }

    /// Sets a plan-level field.
    pub fn set_plan(&mut self, field: PlanField) -> &mut Self {
        self.ops.push(SummaryOp::SetPlan(field));
        self
    }

    /// Appends all operations of `other`.
    pub fn extend(&mut self, other: Self) {
        self.ops.extend(other.ops);
    }

    /// Returns true if there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The operations in order.
    #[must_use]
    pub fn ops(&self) -> &[SummaryOp] {
        &self.ops
    }

    /// The paths written, in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.ops.iter().map(SummaryOp::path).collect()
    }

    /// Applies every operation to `summary`. Returns true if it changed.
    pub fn apply_to(self, summary: &mut PipelineExecutionSummary) -> bool {
        let before = summary.clone();
        for op in self.ops {
            op.apply(summary);
        }
        *summary != before
    }
}
