//! Core domain types for plangraph.
//!
//! This module contains the vocabulary shared by every handler:
//! - Execution status and node classification enums
//! - Ambiance (nesting path) of a node execution
//! - Inbound orchestration events

mod ambiance;
mod event;
mod status;

pub use ambiance::{Ambiance, Level, StrategyMetadata};
pub use event::{MutationApplied, OrchestrationEvent, OrchestrationEventType};
pub use status::{ExecutionKind, ExecutionMode, ExecutionStatus, StepCategory, StrategyType};
