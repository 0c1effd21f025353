//! Summary document storage and its read replicas.
//!
//! Writers go through [`SummaryStore`] with field-path updates. Readers go
//! through a [`SummaryReplica`]; deployments run two of them, a
//! near-real-time secondary for point reads and an analytics node for scans.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::ExecutionStatus;
use crate::errors::GraphResult;
use crate::model::{PipelineExecutionSummary, PipelineKey, SummaryUpdate};

/// Selects summary documents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SummaryFilter {
    /// Match a single plan execution.
    pub plan_execution_id: Option<String>,
    /// Match every execution of a pipeline.
    pub pipeline: Option<PipelineKey>,
    /// Match a plan-level status.
    pub status: Option<ExecutionStatus>,
}

impl SummaryFilter {
    /// Matches every summary.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches one plan execution.
    #[must_use]
    pub fn for_plan(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: Some(plan_execution_id.into()),
            ..Self::default()
        }
    }

    /// Matches the executions of a pipeline.
    #[must_use]
    pub fn for_pipeline(key: PipelineKey) -> Self {
        Self {
            pipeline: Some(key),
            ..Self::default()
        }
    }

    /// Narrows to a plan-level status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns true if `summary` is selected.
    #[must_use]
    pub fn matches(&self, summary: &PipelineExecutionSummary) -> bool {
        self.plan_execution_id
            .as_ref()
            .map_or(true, |id| &summary.plan_execution_id == id)
            && self.pipeline.as_ref().map_or(true, |key| summary.belongs_to(key))
            && self.status.map_or(true, |status| summary.status == status)
    }
}

/// Result of a bulk delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteAck {
    /// Whether the store confirmed the delete.
    pub acknowledged: bool,
    /// How many documents were removed.
    pub deleted_count: u64,
}

/// Write access to summary documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Reads the summary of a plan execution from the primary.
    async fn find(&self, plan_execution_id: &str) -> GraphResult<Option<PipelineExecutionSummary>>;

    /// Applies a field-path update as one write. Returns true if the
    /// document changed; a missing document is left missing.
    async fn update(&self, plan_execution_id: &str, update: SummaryUpdate) -> GraphResult<bool>;

    /// Removes every summary of a pipeline.
    async fn delete_by_pipeline(&self, key: &PipelineKey) -> GraphResult<DeleteAck>;
}

/// Read access to a summary replica.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryReplica: Send + Sync {
    /// First matching summary.
    async fn find_one(&self, filter: &SummaryFilter) -> GraphResult<Option<PipelineExecutionSummary>>;

    /// Number of matching summaries.
    async fn count(&self, filter: &SummaryFilter) -> GraphResult<u64>;

    /// Streams matching summaries, projected to `projection`, in batches of
    /// at most `batch_size` documents.
    fn scan(
        &self,
        filter: &SummaryFilter,
        projection: &[String],
        batch_size: usize,
    ) -> BoxStream<'static, GraphResult<Vec<serde_json::Value>>>;
}

/// Keeps only the dotted `paths` of `document`.
#[must_use]
pub fn project(document: &serde_json::Value, paths: &[String]) -> serde_json::Value {
    let mut projected = serde_json::Value::Object(serde_json::Map::new());
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        let mut source = document;
        let mut found = true;
        for segment in &segments {
            match source.get(segment) {
                Some(next) => source = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }

        let mut target = &mut projected;
        for (index, segment) in segments.iter().enumerate() {
            let Some(object) = target.as_object_mut() else {
                break;
            };
            if index + 1 == segments.len() {
                object.insert((*segment).to_string(), source.clone());
                break;
            }
            target = object
                .entry((*segment).to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        }
    }
    projected
}

/// In-memory summary store and replica.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    documents: RwLock<BTreeMap<String, PipelineExecutionSummary>>,
    writes: RwLock<Vec<(String, SummaryUpdate)>>,
    unacknowledged_deletes: AtomicUsize,
}

impl InMemorySummaryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` bulk deletes go unacknowledged.
    #[must_use]
    pub fn with_unacknowledged_deletes(self, count: usize) -> Self {
        self.unacknowledged_deletes.store(count, Ordering::SeqCst);
        self
    }

    /// Inserts or replaces a whole document.
    pub fn insert(&self, summary: PipelineExecutionSummary) {
        self.documents
            .write()
            .insert(summary.plan_execution_id.clone(), summary);
    }

    /// Current state of a document.
    #[must_use]
    pub fn snapshot(&self, plan_execution_id: &str) -> Option<PipelineExecutionSummary> {
        self.documents.read().get(plan_execution_id).cloned()
    }

    /// Every update applied so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, SummaryUpdate)> {
        self.writes.read().clone()
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if there are no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn matching(&self, filter: &SummaryFilter) -> Vec<PipelineExecutionSummary> {
        self.documents
            .read()
            .values()
            .filter(|summary| filter.matches(summary))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn find(&self, plan_execution_id: &str) -> GraphResult<Option<PipelineExecutionSummary>> {
        Ok(self.snapshot(plan_execution_id))
    }

    async fn update(&self, plan_execution_id: &str, update: SummaryUpdate) -> GraphResult<bool> {
        if update.is_empty() {
            return Ok(false);
        }
        let mut documents = self.documents.write();
        let Some(summary) = documents.get_mut(plan_execution_id) else {
            return Ok(false);
        };
        self.writes
            .write()
            .push((plan_execution_id.to_string(), update.clone()));
        Ok(update.apply_to(summary))
    }

    async fn delete_by_pipeline(&self, key: &PipelineKey) -> GraphResult<DeleteAck> {
        let pending = self.unacknowledged_deletes.load(Ordering::SeqCst);
        if pending > 0 {
            self.unacknowledged_deletes.store(pending - 1, Ordering::SeqCst);
            return Ok(DeleteAck::default());
        }

        let mut documents = self.documents.write();
        let before = documents.len();
        documents.retain(|_, summary| !summary.belongs_to(key));
        Ok(DeleteAck {
            acknowledged: true,
            deleted_count: (before - documents.len()) as u64,
        })
    }
}

#[async_trait]
impl SummaryReplica for InMemorySummaryStore {
    async fn find_one(&self, filter: &SummaryFilter) -> GraphResult<Option<PipelineExecutionSummary>> {
        Ok(self.matching(filter).into_iter().next())
    }

    async fn count(&self, filter: &SummaryFilter) -> GraphResult<u64> {
        Ok(self.matching(filter).len() as u64)
    }

    fn scan(
        &self,
        filter: &SummaryFilter,
        projection: &[String],
        batch_size: usize,
    ) -> BoxStream<'static, GraphResult<Vec<serde_json::Value>>> {
        let projected: GraphResult<Vec<serde_json::Value>> = self
            .matching(filter)
            .iter()
            .map(|summary| Ok(project(&serde_json::to_value(summary)?, projection)))
            .collect();

        match projected {
            Ok(documents) => {
                let batches: Vec<GraphResult<Vec<serde_json::Value>>> = documents
                    .chunks(batch_size.max(1))
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                stream::iter(batches).boxed()
            }
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }
}
