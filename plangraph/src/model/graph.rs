//! The cached detail graph of a plan execution.
//!
//! Vertices live in an id-keyed map and edges are id lists, so retry and
//! sibling back-references never form ownership cycles. Every vertex is
//! placed in exactly one of three positions:
//! - after its previous sibling (`next_ids` of that sibling), if present
//! - under its parent (`edges` of the parent), if present
//! - otherwise in `root_node_ids`
//!
//! Placement is recomputed whenever a vertex arrives, and vertices already
//! waiting for it are re-placed, so arrival order does not matter.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::core::{ExecutionMode, ExecutionStatus};
use crate::model::{FailureInfo, InterruptEffect, NodeExecution, SkipInfo};
use crate::utils::EpochMillis;

/// Detail-graph node derived from a [`NodeExecution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVertex {
    /// Node execution id.
    pub uuid: String,
    /// Plan node (template) id.
    pub plan_node_id: String,
    /// User-facing identifier.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Step type.
    pub step_type: String,
    /// Status.
    pub status: ExecutionStatus,
    /// Start time.
    pub start_ts: Option<EpochMillis>,
    /// End time.
    pub end_ts: Option<EpochMillis>,
    /// Orchestration mode.
    pub mode: ExecutionMode,
    /// Resolved step parameters.
    pub step_parameters: Option<serde_json::Value>,
    /// Outcome documents published by the node.
    pub outcomes: BTreeMap<String, serde_json::Value>,
    /// Step detail documents.
    pub step_details: BTreeMap<String, serde_json::Value>,
    /// Failure details.
    pub failure_info: Option<FailureInfo>,
    /// Skip details.
    pub skip_info: Option<SkipInfo>,
    /// Earlier attempts this vertex replaced.
    pub retry_ids: Vec<String>,
    /// Interrupts that affected the node.
    pub interrupt_histories: Vec<InterruptEffect>,
    /// Store modification marker of the source record.
    pub last_updated_at: EpochMillis,
}

impl GraphVertex {
    /// Derives a vertex from a node execution and its outcomes.
    #[must_use]
    pub fn from_node_execution(
        node: &NodeExecution,
        outcomes: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            uuid: node.id.clone(),
            plan_node_id: node.node_id.clone(),
            identifier: node.identifier.clone(),
            name: node.name.clone(),
            step_type: node.step_type.clone(),
            status: node.status,
            start_ts: node.start_ts,
            end_ts: node.end_ts,
            mode: node.mode,
            step_parameters: node.resolved_step_parameters.clone(),
            outcomes,
            step_details: node.step_details.clone(),
            failure_info: node.failure_info.clone(),
            skip_info: node.skip_info.clone(),
            retry_ids: node.retry_ids.clone(),
            interrupt_histories: node.interrupt_histories.clone(),
            last_updated_at: node.last_updated_at,
        }
    }
}

/// Outgoing edges and back-references of one vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EdgeList {
    /// First vertices of child chains.
    pub edges: Vec<String>,
    /// Following siblings.
    pub next_ids: Vec<String>,
    /// Enclosing vertex, as reported by the node execution.
    pub parent_id: Option<String>,
    /// Preceding sibling, as reported by the node execution.
    pub prev_id: Option<String>,
}

/// Vertices and their edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationAdjacencyList {
    /// Vertex id to vertex.
    pub graph_vertex_map: BTreeMap<String, GraphVertex>,
    /// Vertex id to edges.
    pub adjacency_map: BTreeMap<String, EdgeList>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    Root,
    ChildOf(String),
    NextOf(String),
}

/// The cached detail graph of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationGraph {
    /// Cache key.
    pub plan_execution_id: String,
    /// Entry points of the graph.
    pub root_node_ids: Vec<String>,
    /// Vertices and edges.
    pub adjacency_list: OrchestrationAdjacencyList,
    /// Plan-level status.
    pub status: ExecutionStatus,
    /// Plan start time.
    pub start_ts: EpochMillis,
    /// Plan end time.
    pub end_ts: Option<EpochMillis>,
    /// Incremented on every persisted change.
    pub cache_version: u64,
    /// Newest `last_updated_at` among applied node executions.
    pub last_updated_at: EpochMillis,
}

impl OrchestrationGraph {
    /// Creates an empty running graph.
    #[must_use]
    pub fn new(plan_execution_id: impl Into<String>, start_ts: EpochMillis) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            root_node_ids: Vec::new(),
            adjacency_list: OrchestrationAdjacencyList::default(),
            status: ExecutionStatus::Running,
            start_ts,
            end_ts: None,
            cache_version: 0,
            last_updated_at: 0,
        }
    }

    /// Returns a vertex by id.
    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&GraphVertex> {
        self.adjacency_list.graph_vertex_map.get(id)
    }

    /// Returns the edges of a vertex.
    #[must_use]
    pub fn edge_list(&self, id: &str) -> Option<&EdgeList> {
        self.adjacency_list.adjacency_map.get(id)
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.adjacency_list.graph_vertex_map.len()
    }

    /// Returns true if the graph already holds `node` at its current
    /// modification time, or a retry has replaced it.
    #[must_use]
    pub fn reflects(&self, node: &NodeExecution) -> bool {
        match self.vertex(&node.id) {
            Some(vertex) => vertex.last_updated_at >= node.last_updated_at,
            None => self.resolve(&node.id).is_some(),
        }
    }

    /// Returns true if the plan-level status is terminal.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sets plan-level status and end time.
    pub fn finalize(&mut self, status: ExecutionStatus, end_ts: Option<EpochMillis>) {
        self.status = status;
        self.end_ts = end_ts;
    }

    /// Copies a terminal plan-level status from `other` when this graph
    /// would otherwise report an earlier state. Returns true on change.
    pub fn keep_terminal_from(&mut self, other: &Self) -> bool {
        if other.is_finalized() && !self.is_finalized() {
            self.status = other.status;
            self.end_ts = other.end_ts;
            return true;
        }
        false
    }

    /// Inserts or replaces the vertex for `node`.
    ///
    /// Returns true if anything changed. Re-applying the same node is a
    /// no-op, and a node snapshot older than the stored vertex is ignored.
    /// So is a snapshot of an attempt that a retry already replaced.
    pub fn upsert_vertex(&mut self, node: &NodeExecution, vertex: GraphVertex) -> bool {
        let id = vertex.uuid.clone();
        if let Some(existing) = self.vertex(&id) {
            if existing.last_updated_at > vertex.last_updated_at {
                return false;
            }
        } else if self.resolve(&id).is_some_and(|replacement| replacement != id) {
            return false;
        }

        let mut changed = false;
        for retried in &node.retry_ids {
            if retried != &id {
                changed |= self.replace_retried(retried, &id);
            }
        }

        let vertex_changed = self.vertex(&id) != Some(&vertex);
        self.last_updated_at = self.last_updated_at.max(vertex.last_updated_at);
        self.adjacency_list.graph_vertex_map.insert(id.clone(), vertex);

        let edge_list = self.adjacency_list.adjacency_map.entry(id.clone()).or_default();
        let parent_id = node.parent_id.clone().filter(|p| p != &id);
        let prev_id = node.previous_id.clone().filter(|p| p != &id);
        if edge_list.parent_id != parent_id || edge_list.prev_id != prev_id {
            edge_list.parent_id = parent_id;
            edge_list.prev_id = prev_id;
            changed = true;
        }

        changed |= self.place(&id);

        let stands_for = |candidate: Option<&str>| {
            candidate.is_some_and(|c| c == id || node.retry_ids.iter().any(|retried| retried == c))
        };
        let waiting: Vec<String> = self
            .adjacency_list
            .adjacency_map
            .iter()
            .filter(|(other, edges)| {
                *other != &id
                    && (stands_for(edges.parent_id.as_deref()) || stands_for(edges.prev_id.as_deref()))
            })
            .map(|(other, _)| other.clone())
            .collect();
        for other in waiting {
            changed |= self.place(&other);
        }

        changed || vertex_changed
    }

    fn target_placement(&self, id: &str) -> Placement {
        let Some(edges) = self.edge_list(id) else {
            return Placement::Root;
        };
        if let Some(prev) = edges.prev_id.as_deref().and_then(|prev| self.resolve(prev)) {
            if prev != id {
                return Placement::NextOf(prev);
            }
        }
        if let Some(parent) = edges.parent_id.as_deref().and_then(|parent| self.resolve(parent)) {
            if parent != id {
                return Placement::ChildOf(parent);
            }
        }
        Placement::Root
    }

    /// Resolves an id to the vertex standing for it: the vertex itself, or
    /// the attempt that replaced it through a retry.
    fn resolve(&self, id: &str) -> Option<String> {
        if self.vertex(id).is_some() {
            return Some(id.to_string());
        }
        self.adjacency_list
            .graph_vertex_map
            .values()
            .find(|vertex| vertex.retry_ids.iter().any(|retried| retried == id))
            .map(|vertex| vertex.uuid.clone())
    }

    fn is_placed(&self, id: &str, placement: &Placement) -> bool {
        let owned = id.to_string();
        match placement {
            Placement::Root => self.root_node_ids.contains(&owned),
            Placement::ChildOf(parent) => self
                .edge_list(parent)
                .is_some_and(|edges| edges.edges.contains(&owned)),
            Placement::NextOf(prev) => self
                .edge_list(prev)
                .is_some_and(|edges| edges.next_ids.contains(&owned)),
        }
    }

    fn detach(&mut self, id: &str) {
        self.root_node_ids.retain(|root| root != id);
        for edges in self.adjacency_list.adjacency_map.values_mut() {
            edges.edges.retain(|child| child != id);
            edges.next_ids.retain(|next| next != id);
        }
    }

    fn place(&mut self, id: &str) -> bool {
        let target = self.target_placement(id);
        if self.is_placed(id, &target) {
            return false;
        }
        self.detach(id);
        let owned = id.to_string();
        match target {
            Placement::Root => self.root_node_ids.push(owned),
            Placement::ChildOf(parent) => self
                .adjacency_list
                .adjacency_map
                .entry(parent)
                .or_default()
                .edges
                .push(owned),
            Placement::NextOf(prev) => self
                .adjacency_list
                .adjacency_map
                .entry(prev)
                .or_default()
                .next_ids
                .push(owned),
        }
        true
    }

    /// Removes a retried attempt and hands its followers to `replacement`.
    fn replace_retried(&mut self, old: &str, replacement: &str) -> bool {
        if self.vertex(old).is_none() {
            return false;
        }
        let old_edges = self
            .adjacency_list
            .adjacency_map
            .get(old)
            .cloned()
            .unwrap_or_default();

        let subtree = self.descendants_of(&old_edges.edges);
        for removed in &subtree {
            self.detach(removed);
            self.adjacency_list.graph_vertex_map.remove(removed);
            self.adjacency_list.adjacency_map.remove(removed);
        }

        self.detach(old);
        self.adjacency_list.graph_vertex_map.remove(old);
        self.adjacency_list.adjacency_map.remove(old);

        let followers = old_edges.next_ids.into_iter().filter(|next| next != replacement);
        let entry = self
            .adjacency_list
            .adjacency_map
            .entry(replacement.to_string())
            .or_default();
        for next in followers {
            if !entry.next_ids.contains(&next) {
                entry.next_ids.push(next);
            }
        }
        true
    }

    fn descendants_of(&self, starts: &[String]) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = starts.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(edges) = self.edge_list(&id) {
                queue.extend(edges.edges.iter().cloned());
                queue.extend(edges.next_ids.iter().cloned());
            }
        }
        seen
    }

    /// All vertex ids reachable from the roots.
    #[must_use]
    pub fn reachable_ids(&self) -> BTreeSet<String> {
        self.descendants_of(&self.root_node_ids)
    }

    /// Vertices not reachable from any root. Empty for every valid graph.
    #[must_use]
    pub fn unreachable_vertices(&self) -> Vec<String> {
        let reachable = self.reachable_ids();
        self.adjacency_list
            .graph_vertex_map
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect()
    }
}
