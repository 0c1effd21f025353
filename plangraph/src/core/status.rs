//! Execution status and node classification enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a plan or node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Known to the plan but not yet started.
    #[default]
    NotStarted,
    /// Waiting for a slot to run.
    Queued,
    /// Currently running.
    Running,
    /// Waiting on an asynchronous callback.
    AsyncWaiting,
    /// Waiting on a manual approval.
    ApprovalWaiting,
    /// Waiting on a manual intervention after a failure.
    InterventionWaiting,
    /// Paused by a user.
    Paused,
    /// Being aborted or expired; children are winding down.
    Discontinuing,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
    /// Finished with an infrastructure error.
    Errored,
    /// Aborted by a user.
    Aborted,
    /// Timed out.
    Expired,
    /// Skipped by a condition.
    Skipped,
    /// Failed, but the failure was ignored by a strategy.
    IgnoreFailed,
    /// An approval was rejected.
    ApprovalRejected,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::AsyncWaiting => "ASYNC_WAITING",
            Self::ApprovalWaiting => "APPROVAL_WAITING",
            Self::InterventionWaiting => "INTERVENTION_WAITING",
            Self::Paused => "PAUSED",
            Self::Discontinuing => "DISCONTINUING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Errored => "ERRORED",
            Self::Aborted => "ABORTED",
            Self::Expired => "EXPIRED",
            Self::Skipped => "SKIPPED",
            Self::IgnoreFailed => "IGNORE_FAILED",
            Self::ApprovalRejected => "APPROVAL_REJECTED",
        };
        write!(f, "{s}")
    }
}

impl ExecutionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Failed
                | Self::Errored
                | Self::Aborted
                | Self::Expired
                | Self::Skipped
                | Self::IgnoreFailed
                | Self::ApprovalRejected
        )
    }

    /// Returns true if the status indicates a broken run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Errored | Self::Aborted | Self::Expired | Self::ApprovalRejected
        )
    }
}

/// Where a node sits in the pipeline hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCategory {
    /// The pipeline root.
    Pipeline,
    /// The container holding all stages.
    Stages,
    /// A single stage.
    Stage,
    /// A matrix, loop or parallelism wrapper.
    Strategy,
    /// A group of steps inside a stage.
    StepGroup,
    /// A fork of parallel children.
    Fork,
    /// A leaf step.
    #[default]
    Step,
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "PIPELINE"),
            Self::Stages => write!(f, "STAGES"),
            Self::Stage => write!(f, "STAGE"),
            Self::Strategy => write!(f, "STRATEGY"),
            Self::StepGroup => write!(f, "STEP_GROUP"),
            Self::Fork => write!(f, "FORK"),
            Self::Step => write!(f, "STEP"),
        }
    }
}

/// Whether a node execution ran for real or replays an earlier result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionKind {
    /// An ordinary execution.
    #[default]
    Standard,
    /// A stand-in that reuses the result of a previous run.
    Identity,
}

/// How the orchestrator drives a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Runs inline and returns a result.
    #[default]
    Sync,
    /// Runs out of band and reports back.
    Async,
    /// Delegates to a queued task.
    Task,
    /// Spawns a single child.
    Child,
    /// Spawns several children at once.
    Children,
    /// Spawns children one after another.
    ChildChain,
}

/// The flavor of a strategy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    /// Cartesian product over axes.
    Matrix,
    /// Repeats over items or a count.
    Loop,
    /// N identical copies; concurrency is implicit.
    Parallelism,
}

impl StrategyType {
    /// Parses the `strategyType` field of resolved step parameters.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "matrix" => Some(Self::Matrix),
            "loop" | "repeat" | "for" => Some(Self::Loop),
            "parallelism" => Some(Self::Parallelism),
            _ => None,
        }
    }
}
