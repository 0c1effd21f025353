//! Error types for the plangraph engine.
//!
//! Handlers return [`GraphError`]. The variants split into errors the
//! consumer should redeliver (store hiccups) and errors that will fail the
//! same way on every attempt (a start event for a plan that does not exist).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for plangraph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The event references something that does not exist upstream.
    #[error("{0}")]
    InvalidRequest(#[from] InvalidRequestError),

    /// A backing store failed to read or write.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Bulk deletion of summaries was not acknowledged.
    #[error("{0}")]
    SummaryDeletion(#[from] SummaryDeletionError),

    /// A read against the summary collection was rejected before it ran.
    #[error("Invalid summary query: {0}")]
    InvalidQuery(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Returns true when redelivering the triggering event may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::SummaryDeletion(_))
    }

    /// Shorthand for an [`InvalidQuery`](Self::InvalidQuery) error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Shorthand for a store error against `store`.
    #[must_use]
    pub fn store(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store(StoreError::new(store, message))
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Store(_) => "Store",
            Self::SummaryDeletion(_) => "SummaryDeletion",
            Self::InvalidQuery(_) => "InvalidQuery",
            Self::Config(_) => "Config",
            Self::Serialization(_) => "Serialization",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retriable".to_string(), serde_json::json!(self.is_retriable()));
        map
    }
}

/// Raised when an event points at an entity that does not exist.
///
/// This is an ordering or programming error upstream. It aborts processing
/// of that one event and is never retried.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Invalid request: {entity} '{id}' {reason}")]
pub struct InvalidRequestError {
    /// The kind of entity that was looked up.
    pub entity: String,
    /// The id that was looked up.
    pub id: String,
    /// What was wrong.
    pub reason: String,
}

impl InvalidRequestError {
    /// Creates a new invalid request error.
    #[must_use]
    pub fn new(entity: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// The referenced plan execution does not exist.
    #[must_use]
    pub fn plan_not_found(plan_execution_id: impl Into<String>) -> Self {
        Self::new("plan execution", plan_execution_id, "does not exist")
    }
}

/// A failure reported by a backing store.
#[derive(Debug, Clone, Error)]
#[error("Store error in {store}: {message}")]
pub struct StoreError {
    /// The store that failed.
    pub store: String,
    /// The failure message.
    pub message: String,
}

impl StoreError {
    /// Creates a new store error.
    #[must_use]
    pub fn new(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            message: message.into(),
        }
    }
}

/// Raised when summaries of a deleted pipeline could not be removed.
#[derive(Debug, Clone, Error)]
#[error("Failed to delete execution summaries for pipeline '{pipeline_identifier}' after {attempts} attempt(s)")]
pub struct SummaryDeletionError {
    /// The pipeline whose summaries were being deleted.
    pub pipeline_identifier: String,
    /// How many attempts were made.
    pub attempts: usize,
}

impl SummaryDeletionError {
    /// Creates a new summary deletion error.
    #[must_use]
    pub fn new(pipeline_identifier: impl Into<String>, attempts: usize) -> Self {
        Self {
            pipeline_identifier: pipeline_identifier.into(),
            attempts,
        }
    }
}

/// Result alias used across the crate.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_not_found_is_not_retriable() {
        let err: GraphError = InvalidRequestError::plan_not_found("plan-1").into();
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("plan-1"));
    }

    #[test]
    fn test_store_error_is_retriable() {
        let err = GraphError::store("graph_cache", "timeout");
        assert!(err.is_retriable());
        assert_eq!(err.to_string(), "Store error in graph_cache: timeout");
    }

    #[test]
    fn test_summary_deletion_message() {
        let err: GraphError = SummaryDeletionError::new("pipe", 3).into();
        assert!(err.to_string().contains("'pipe' after 3 attempt(s)"));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_error_to_dict() {
        let err = GraphError::invalid_query("projection is required");
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "InvalidQuery");
        assert_eq!(dict.get("retriable").unwrap(), false);
    }
}
