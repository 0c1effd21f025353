//! In-memory engine wiring and node builders for tests.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::{Ambiance, ExecutionStatus, Level, MutationApplied, OrchestrationEvent, StepCategory};
use crate::errors::GraphResult;
use crate::events::EventLogPublisher;
use crate::graph::{GraphEventHandler, GraphRepairer};
use crate::model::{
    EdgeLayoutList, GraphLayoutNode, NodeExecution, OrchestrationGraph, PipelineExecutionSummary,
    PipelineKey, PlanExecution,
};
use crate::store::{
    CollectingEventLogStream, GraphCache, InMemoryEventLogStore, InMemoryGraphCache,
    InMemoryNodeExecutionStore, InMemoryOutcomeStore, InMemoryPlanExecutionStore,
    InMemorySpawnedChildrenStore, InMemorySummaryStore, PlanExecutionStore,
};
use crate::summary::ExecutionSummaryService;
use crate::utils::EpochMillis;

/// What each consumer did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// Detail graph.
    pub graph: MutationApplied,
    /// Event log.
    pub logged: MutationApplied,
    /// Execution summary.
    pub summary: MutationApplied,
}

/// Every handler wired over in-memory stores.
pub struct TestEnv {
    /// Plan executions.
    pub plans: Arc<InMemoryPlanExecutionStore>,
    /// Node executions.
    pub nodes: Arc<InMemoryNodeExecutionStore>,
    /// Node outcomes.
    pub outcomes: Arc<InMemoryOutcomeStore>,
    /// Spawned strategy children.
    pub spawned: Arc<InMemorySpawnedChildrenStore>,
    /// Detail graph cache.
    pub cache: Arc<InMemoryGraphCache>,
    /// Event log rows.
    pub event_log: Arc<InMemoryEventLogStore>,
    /// Published event log payloads.
    pub stream: Arc<CollectingEventLogStream>,
    /// Summary documents.
    pub summaries: Arc<InMemorySummaryStore>,
    /// Detail graph router.
    pub graph: GraphEventHandler,
    /// Event log publisher.
    pub publisher: EventLogPublisher,
    /// Summary service.
    pub summary: ExecutionSummaryService,
    /// Graph repair.
    pub repairer: GraphRepairer,
}

impl TestEnv {
    /// Creates an environment with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates an environment with `config`.
    #[must_use]
    pub fn with_config(config: &EngineConfig) -> Self {
        let plans = Arc::new(InMemoryPlanExecutionStore::new());
        let nodes = Arc::new(InMemoryNodeExecutionStore::new());
        let outcomes = Arc::new(InMemoryOutcomeStore::new());
        let spawned = Arc::new(InMemorySpawnedChildrenStore::new());
        let cache = Arc::new(InMemoryGraphCache::new());
        let event_log = Arc::new(InMemoryEventLogStore::new());
        let stream = Arc::new(CollectingEventLogStream::new());
        let summaries = Arc::new(InMemorySummaryStore::new());

        let graph = GraphEventHandler::new(
            plans.clone(),
            nodes.clone(),
            outcomes.clone(),
            cache.clone(),
            config,
        );
        let repairer = GraphRepairer::new(
            plans.clone(),
            nodes.clone(),
            event_log.clone(),
            cache.clone(),
            graph.status_helper(),
            config.graph_cache_ttl(),
        );
        let publisher = EventLogPublisher::new(event_log.clone(), stream.clone(), config.event_log_ttl());
        let summary = ExecutionSummaryService::new(
            nodes.clone(),
            plans.clone(),
            spawned.clone(),
            summaries.clone(),
        )
        .with_delete_retry(config.summary_delete_retry.clone());

        Self {
            plans,
            nodes,
            outcomes,
            spawned,
            cache,
            event_log,
            stream,
            summaries,
            graph,
            publisher,
            summary,
            repairer,
        }
    }

    /// Delivers `event` to the graph router, the publisher and the summary
    /// service, in that order.
    pub async fn dispatch(&self, event: &OrchestrationEvent) -> GraphResult<Dispatched> {
        Ok(Dispatched {
            graph: self.graph.handle(event).await?,
            logged: self.publisher.handle(event).await?,
            summary: self.summary.handle(event).await?,
        })
    }

    /// Registers a running plan and delivers its start event.
    pub async fn start_plan(&self, plan_execution_id: &str, start_ts: EpochMillis) -> GraphResult<Dispatched> {
        self.plans.put(PlanExecution::running(plan_execution_id, start_ts));
        self.dispatch(&OrchestrationEvent::start(plan_execution_id)).await
    }

    /// Stores `node` and delivers a status update for it.
    pub async fn update_node(&self, node: NodeExecution) -> GraphResult<Dispatched> {
        let event = OrchestrationEvent::status_update(node.plan_execution_id(), node.id.clone());
        self.nodes.put(node);
        self.dispatch(&event).await
    }

    /// Marks the plan finished and delivers its end event.
    pub async fn end_plan(
        &self,
        plan_execution_id: &str,
        status: ExecutionStatus,
        end_ts: EpochMillis,
    ) -> GraphResult<Dispatched> {
        let start_ts = self
            .plans
            .get(plan_execution_id)
            .await?
            .map_or(0, |plan| plan.start_ts);
        self.plans
            .put(PlanExecution::running(plan_execution_id, start_ts).finished(status, end_ts));
        self.dispatch(&OrchestrationEvent::end(plan_execution_id)).await
    }

    /// The cached detail graph.
    pub async fn cached_graph(&self, plan_execution_id: &str) -> GraphResult<Option<OrchestrationGraph>> {
        self.cache.get(plan_execution_id).await
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A stage directly under the pipeline.
#[must_use]
pub fn stage(plan_execution_id: &str, id: &str, template: &str) -> NodeExecution {
    let ambiance = Ambiance::new(plan_execution_id).with_level(Level::new(template, id, StepCategory::Stage));
    NodeExecution::new(id, template, ambiance).with_identifier(template)
}

/// A step inside `stage`.
#[must_use]
pub fn step(stage: &NodeExecution, id: &str, template: &str) -> NodeExecution {
    let ambiance = stage
        .ambiance
        .clone()
        .with_level(Level::new(template, id, StepCategory::Step));
    NodeExecution::new(id, template, ambiance)
        .with_identifier(template)
        .with_parent(stage.id.clone())
}

/// A strategy wrapping whole stages.
#[must_use]
pub fn stage_strategy(plan_execution_id: &str, id: &str, template: &str, kind: &str) -> NodeExecution {
    let ambiance =
        Ambiance::new(plan_execution_id).with_level(Level::new(template, id, StepCategory::Strategy));
    NodeExecution::new(id, template, ambiance)
        .with_step_type("STRATEGY")
        .with_step_parameters(serde_json::json!({ "strategyType": kind }))
}

/// One iteration of `strategy`, running stage template `template`.
#[must_use]
pub fn strategy_child(strategy: &NodeExecution, id: &str, template: &str) -> NodeExecution {
    let ambiance = strategy
        .ambiance
        .clone()
        .with_level(Level::new(template, id, StepCategory::Stage));
    NodeExecution::new(id, template, ambiance)
        .with_identifier(format!("{template}_{id}"))
        .with_parent(strategy.id.clone())
}

/// A summary with one stage-level strategy whose only child is the
/// placeholder for stage template `placeholder`.
#[must_use]
pub fn summary_with_placeholder(
    plan_execution_id: &str,
    strategy_template: &str,
    placeholder: &str,
) -> PipelineExecutionSummary {
    PipelineExecutionSummary::new(PipelineKey::new("acc", "org", "proj", "pipe"), plan_execution_id)
        .with_layout_node(
            strategy_template,
            GraphLayoutNode {
                node_type: "STRATEGY".to_string(),
                node_group: "STRATEGY".to_string(),
                node_uuid: strategy_template.to_string(),
                edge_layout_list: EdgeLayoutList::new(vec![placeholder.to_string()], vec![]),
                module: Some("pms".to_string()),
                ..Default::default()
            },
        )
        .with_layout_node(
            placeholder,
            GraphLayoutNode {
                node_type: "Deployment".to_string(),
                node_group: "STAGE".to_string(),
                node_uuid: placeholder.to_string(),
                module: Some("cd".to_string()),
                ..Default::default()
            },
        )
}
