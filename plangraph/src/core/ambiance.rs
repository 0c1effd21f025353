//! Ambiance: the nesting path of a node execution inside its plan.

use serde::{Deserialize, Serialize};

use super::StepCategory;

/// Iteration coordinates of a strategy child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StrategyMetadata {
    /// Zero-based iteration index.
    pub current_iteration: u32,
    /// Total number of iterations.
    pub total_iterations: u32,
}

/// One level of nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    /// Plan node (template) id of this level.
    pub setup_id: String,
    /// Node execution id of this level.
    pub runtime_id: String,
    /// User-facing identifier.
    #[serde(default)]
    pub identifier: String,
    /// Step type, e.g. `Deployment` or `STRATEGY`.
    #[serde(default)]
    pub step_type: String,
    /// Hierarchy group of this level.
    pub group: StepCategory,
    /// Present when this level is an iteration of a strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_metadata: Option<StrategyMetadata>,
}

impl Level {
    /// Creates a level.
    #[must_use]
    pub fn new(setup_id: impl Into<String>, runtime_id: impl Into<String>, group: StepCategory) -> Self {
        Self {
            setup_id: setup_id.into(),
            runtime_id: runtime_id.into(),
            identifier: String::new(),
            step_type: String::new(),
            group,
            strategy_metadata: None,
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Sets the strategy metadata.
    #[must_use]
    pub fn with_strategy_metadata(mut self, metadata: StrategyMetadata) -> Self {
        self.strategy_metadata = Some(metadata);
        self
    }
}

/// Execution context of a node execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Ambiance {
    /// The owning plan execution.
    pub plan_execution_id: String,
    /// Levels from the pipeline root down to the node itself.
    #[serde(default)]
    pub levels: Vec<Level>,
}

impl Ambiance {
    /// Creates an ambiance with no levels.
    #[must_use]
    pub fn new(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            levels: Vec::new(),
        }
    }

    /// Appends a level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.levels.push(level);
        self
    }

    /// The innermost level, i.e. the node itself.
    #[must_use]
    pub fn current_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    fn ancestors(&self) -> &[Level] {
        match self.levels.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Returns true when the node is a strategy wrapping whole stages.
    ///
    /// Strategies nested inside a stage (around steps or step groups) have a
    /// stage among their ancestors and return false.
    #[must_use]
    pub fn is_strategy_at_stage_level(&self) -> bool {
        self.current_level()
            .is_some_and(|level| level.group == StepCategory::Strategy)
            && !self.ancestors().iter().any(|level| level.group == StepCategory::Stage)
    }

    /// Returns true when a strategy level encloses the node.
    #[must_use]
    pub fn is_under_strategy(&self) -> bool {
        self.ancestors()
            .iter()
            .any(|level| level.group == StepCategory::Strategy)
    }

    /// Returns true when the node is a stage or a stage-level strategy.
    #[must_use]
    pub fn is_stage_or_stage_strategy(&self) -> bool {
        self.current_level()
            .is_some_and(|level| level.group == StepCategory::Stage)
            || self.is_strategy_at_stage_level()
    }
}
