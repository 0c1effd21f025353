//! Guarded reads of execution summaries.
//!
//! Point lookups and counts go to the near-real-time replica. Streaming
//! scans go to the analytics replica and must name the fields they want
//! and a bounded batch size; anything else is rejected before a replica is
//! touched.

use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::{EngineConfig, MAX_BATCH_SIZE};
use crate::errors::{GraphError, GraphResult};
use crate::model::PipelineExecutionSummary;
use crate::store::{SummaryFilter, SummaryReplica};

/// A streaming summary query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryStreamQuery {
    /// Which summaries to scan.
    pub filter: SummaryFilter,
    /// Dotted document paths to return. Must not be empty.
    pub projection: Vec<String>,
    /// Documents per batch. Required.
    pub batch_size: Option<usize>,
}

impl SummaryStreamQuery {
    /// Creates a query with no projection and no batch size.
    #[must_use]
    pub fn new(filter: SummaryFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Sets the projection.
    #[must_use]
    pub fn with_projection<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Routes summary reads to the right replica.
pub struct SummaryReadHelper {
    near_real_time: Arc<dyn SummaryReplica>,
    analytics: Arc<dyn SummaryReplica>,
    max_batch_size: usize,
}

impl SummaryReadHelper {
    /// Creates a helper with the default batch limit.
    #[must_use]
    pub fn new(near_real_time: Arc<dyn SummaryReplica>, analytics: Arc<dyn SummaryReplica>) -> Self {
        Self {
            near_real_time,
            analytics,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Creates a helper using the configured batch limit.
    #[must_use]
    pub fn from_config(
        near_real_time: Arc<dyn SummaryReplica>,
        analytics: Arc<dyn SummaryReplica>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(near_real_time, analytics).with_max_batch_size(config.max_batch_size)
    }

    /// Overrides the batch limit.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// First summary matching `filter`.
    pub async fn find_one(&self, filter: &SummaryFilter) -> GraphResult<Option<PipelineExecutionSummary>> {
        self.near_real_time.find_one(filter).await
    }

    /// Number of summaries matching `filter`.
    pub async fn count(&self, filter: &SummaryFilter) -> GraphResult<u64> {
        self.near_real_time.count(filter).await
    }

    /// Streams projected summaries in batches.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidQuery`] when the projection is empty or
    /// the batch size is missing, zero, or above the limit.
    #[instrument(skip(self, query), fields(batch_size = ?query.batch_size, fields = query.projection.len()))]
    pub fn stream(
        &self,
        query: &SummaryStreamQuery,
    ) -> GraphResult<BoxStream<'static, GraphResult<Vec<serde_json::Value>>>> {
        let batch_size = self.validate(query)?;
        debug!("Streaming summaries from analytics replica");
        Ok(self.analytics.scan(&query.filter, &query.projection, batch_size))
    }

    fn validate(&self, query: &SummaryStreamQuery) -> GraphResult<usize> {
        if query.projection.iter().all(|path| path.trim().is_empty()) {
            return Err(GraphError::invalid_query("projection fields cannot be empty"));
        }
        match query.batch_size {
            None => Err(GraphError::invalid_query("batch size is required")),
            Some(0) => Err(GraphError::invalid_query("batch size must be positive")),
            Some(size) if size > self.max_batch_size => Err(GraphError::invalid_query(format!(
                "batch size {size} exceeds the maximum of {}",
                self.max_batch_size
            ))),
            Some(size) => Ok(size),
        }
    }
}
