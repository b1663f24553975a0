//! Node definition contract
//!
//! A `NodeDefinition` is the per-type record the registry maps a type name
//! to: default state, port layout, compute function and lifecycle hooks.
//! Definitions are stateless; everything that varies per node lives in the
//! node's `NodeState` payload.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{EngineError, Result};
use crate::extensions::ExecutorExtensions;
use crate::types::{ExecutionResult, InputValues, NodeMetadata, NodeState, PortDescriptor, PortId};

/// Everything a compute function may look at
///
/// The state is a snapshot taken when execution started; edits made while
/// the computation is in flight are not visible here.
pub struct ExecutionContext<'a, S> {
    pub node_id: &'a str,
    pub state: &'a S,
    pub inputs: &'a InputValues,
    pub extensions: &'a ExecutorExtensions,
}

impl<'a, S> ExecutionContext<'a, S> {
    /// Resolved value for a sink port, `None` when unconnected
    pub fn input(&self, port: &str) -> Option<&'a serde_json::Value> {
        self.inputs.get(port)
    }

    /// Resolved value for a sink port the node cannot run without
    pub fn require_input(&self, port: &str) -> Result<&'a serde_json::Value> {
        self.inputs
            .get(port)
            .ok_or_else(|| EngineError::MissingInput(format!("{}.{}", self.node_id, port)))
    }
}

/// Per-type contract for a node
///
/// # Example
///
/// ```ignore
/// struct NumberDefinition;
///
/// #[async_trait]
/// impl NodeDefinition<CanvasNode> for NumberDefinition {
///     fn metadata(&self) -> NodeMetadata { ... }
///     fn default_state(&self) -> CanvasNode { CanvasNode::Number(NumberNode { value: 0.0 }) }
///     fn body_height(&self, _state: &CanvasNode) -> f64 { 40.0 }
///     fn ports(&self, state: &CanvasNode) -> Vec<PortDescriptor> { ... }
///     async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> { ... }
/// }
/// ```
#[async_trait]
pub trait NodeDefinition<S: NodeState>: Send + Sync {
    /// Static metadata for this type
    fn metadata(&self) -> NodeMetadata;

    /// State of a freshly instantiated node
    fn default_state(&self) -> S;

    /// Body height hint for the renderer; port anchors may depend on it
    fn body_height(&self, state: &S) -> f64;

    /// Ports as a pure function of the current state
    fn ports(&self, state: &S) -> Vec<PortDescriptor>;

    /// Compute outputs from resolved inputs
    async fn execute(&self, ctx: ExecutionContext<'_, S>) -> Result<ExecutionResult>;

    /// Write a successful result back into the node's own state
    ///
    /// Runs under the engine's update path, against the *current* state, so
    /// field edits made while the computation was in flight are preserved.
    fn apply_result(&self, _state: &mut S, _result: &ExecutionResult) {}

    /// Called after a connection to one of this node's ports is added
    fn on_port_connect(&self, _state: &mut S, _port_id: &str) {}

    /// Called after a connection to one of this node's ports is removed
    fn on_port_disconnect(&self, _state: &mut S, _port_id: &str) {}

    /// Ports keyed by id
    fn port_map(&self, state: &S) -> BTreeMap<PortId, PortDescriptor> {
        self.ports(state)
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect()
    }

    /// Look up a single port
    fn port(&self, state: &S, port_id: &str) -> Option<PortDescriptor> {
        self.ports(state).into_iter().find(|p| p.id == port_id)
    }
}
