//! Graph state storage
//!
//! Nodes and connections live in flat maps keyed by stable ids. Nothing
//! holds a pointer to another node; adjacency always goes through the
//! [`ConnectionGraph`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::connections::ConnectionGraph;
use crate::error::{EngineError, Result};
use crate::types::{ExecutionResult, ExecutionStatus, NodeId, NodeState};

/// A node instance and its engine-owned bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord<S> {
    /// Stable, host-assigned identifier
    pub id: NodeId,
    /// Per-type state payload
    pub state: S,
    /// Whether `outputs` may no longer reflect the current inputs
    pub is_out_of_date: bool,
    /// Last produced values, read by consumers
    #[serde(default)]
    pub outputs: ExecutionResult,
    /// True while the compute function is in flight
    #[serde(default)]
    pub is_generating: bool,
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Message of the most recent failed execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Bumped on every invalidation; an execution that started under an
    /// older epoch cannot clear staleness.
    #[serde(skip)]
    pub(crate) epoch: u64,
    /// Identifies the execution that currently owns `is_generating`
    #[serde(skip)]
    pub(crate) run_id: u64,
}

impl<S: NodeState> NodeRecord<S> {
    /// A fresh, never-executed node
    pub fn new(id: impl Into<String>, state: S) -> Self {
        Self {
            id: id.into(),
            state,
            is_out_of_date: true,
            outputs: ExecutionResult::new(),
            is_generating: false,
            status: ExecutionStatus::Idle,
            last_error: None,
            epoch: 0,
            run_id: 0,
        }
    }

    pub fn node_type(&self) -> &str {
        self.state.node_type()
    }
}

/// Nodes plus connections: the only shared mutable state of the engine
#[derive(Debug, Clone)]
pub struct GraphState<S> {
    pub(crate) nodes: BTreeMap<NodeId, NodeRecord<S>>,
    pub(crate) connections: ConnectionGraph,
}

impl<S: NodeState> GraphState<S> {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            connections: ConnectionGraph::new(),
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Result<&NodeRecord<S>> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))
    }

    pub fn node_mut(&mut self, node_id: &str) -> Result<&mut NodeRecord<S>> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord<S>> {
        self.nodes.values()
    }

    pub fn connections(&self) -> &ConnectionGraph {
        &self.connections
    }

    pub(crate) fn insert_node(&mut self, record: NodeRecord<S>) -> Result<()> {
        if self.nodes.contains_key(&record.id) {
            return Err(EngineError::DuplicateNode(record.id));
        }
        self.nodes.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<S: NodeState> Default for GraphState<S> {
    fn default() -> Self {
        Self::new()
    }
}
