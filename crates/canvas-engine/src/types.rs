//! Core types for canvas node graphs
//!
//! These types define ports, connections, output values and per-type
//! metadata. Node state payloads are supplied by the host crate through the
//! [`NodeState`] trait.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Unique identifier for a node (assigned by the host)
pub type NodeId = String;

/// Unique identifier for a port within its node
pub type PortId = String;

/// Inputs handed to a node's compute function, keyed by sink port id
///
/// Unconnected sink ports are absent.
pub type InputValues = HashMap<PortId, serde_json::Value>;

/// Data kind tag used only for connection compatibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    /// Wildcard, compatible with everything
    Any,
    /// Plain text
    Text,
    /// Prompt text with optional reference images
    Prompt,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// List of image URLs
    ImageList,
    /// Video URL
    Video,
    /// Uploaded file reference
    File,
}

impl DataKind {
    /// Check if a source of this kind can feed a sink of `other`
    pub fn is_compatible_with(&self, other: &DataKind) -> bool {
        if matches!(self, DataKind::Any) || matches!(other, DataKind::Any) {
            return true;
        }

        // Prompt is compatible with Text
        if matches!(
            (self, other),
            (DataKind::Prompt, DataKind::Text) | (DataKind::Text, DataKind::Prompt)
        ) {
            return true;
        }

        self == other
    }
}

/// Which end of a connection a port sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Produces a value; connections start here
    #[serde(rename = "start")]
    Source,
    /// Consumes a value; connections end here
    #[serde(rename = "end")]
    Sink,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

/// Geometric anchor of a port relative to its node
///
/// Only the rendering collaborator reads this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortAnchor {
    pub x: f64,
    pub y: f64,
}

impl PortAnchor {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Description of a single connection point on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
    /// Port identifier, unique within the node
    pub id: PortId,
    /// Source or sink
    pub direction: PortDirection,
    /// Anchor for rendering
    pub anchor: PortAnchor,
    /// Compatibility tag
    pub data_kind: DataKind,
    /// Whether the node cannot run without this input (sinks only)
    pub required: bool,
}

impl PortDescriptor {
    /// Create a source (output) port
    pub fn source(id: impl Into<String>, data_kind: DataKind, anchor: PortAnchor) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Source,
            anchor,
            data_kind,
            required: false,
        }
    }

    /// Create an optional sink (input) port
    pub fn sink(id: impl Into<String>, data_kind: DataKind, anchor: PortAnchor) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Sink,
            anchor,
            data_kind,
            required: false,
        }
    }

    /// Mark this port as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_source(&self) -> bool {
        self.direction == PortDirection::Source
    }

    pub fn is_sink(&self) -> bool {
        self.direction == PortDirection::Sink
    }
}

/// A `(node, port)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRef {
    pub node_id: NodeId,
    pub port_id: PortId,
}

impl PortRef {
    pub fn new(node_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            port_id: port_id.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.port_id)
    }
}

/// A directed edge from a source port to a sink port
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub source: PortRef,
    pub sink: PortRef,
}

impl Connection {
    pub fn new(source: PortRef, sink: PortRef) -> Self {
        Self { source, sink }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.sink)
    }
}

/// A value on an output port
///
/// `Stop` is the `STOP_EXECUTION` sentinel: "no value can be produced right
/// now". It blocks consumers without raising an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PortValue {
    Value(serde_json::Value),
    Stop,
}

impl PortValue {
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Stop => None,
        }
    }
}

impl From<serde_json::Value> for PortValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

/// Mapping from output port ids to values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionResult(BTreeMap<PortId, PortValue>);

impl ExecutionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result with every listed port set to `Stop`
    pub fn stopped<'a>(ports: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            ports
                .into_iter()
                .map(|p| (p.to_string(), PortValue::Stop))
                .collect(),
        )
    }

    /// Builder-style insert of a concrete value
    pub fn with_value(mut self, port: impl Into<String>, value: serde_json::Value) -> Self {
        self.0.insert(port.into(), PortValue::Value(value));
        self
    }

    /// Builder-style insert of the stop sentinel
    pub fn with_stop(mut self, port: impl Into<String>) -> Self {
        self.0.insert(port.into(), PortValue::Stop);
        self
    }

    pub fn insert(&mut self, port: impl Into<String>, value: PortValue) {
        self.0.insert(port.into(), value);
    }

    pub fn get(&self, port: &str) -> Option<&PortValue> {
        self.0.get(port)
    }

    /// Concrete value on a port, `None` if absent or stopped
    pub fn value(&self, port: &str) -> Option<&serde_json::Value> {
        self.0.get(port).and_then(PortValue::as_value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortId, &PortValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when every port carries the stop sentinel
    pub fn is_blocked(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(PortValue::is_stop)
    }
}

/// Category of a node type, for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Text, file and constant inputs
    Input,
    /// AI generation nodes
    Generation,
    /// Arithmetic nodes
    Math,
    /// Control flow nodes
    Control,
}

/// Execution mode for a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Cheap and pure; pulled on demand when a consumer needs a fresh value
    Reactive,
    /// Requires an explicit trigger; a stale output blocks consumers
    Manual,
}

/// Static metadata describing a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// Unique type identifier (e.g. "imageGeneration")
    pub node_type: String,
    /// Human-readable title
    pub title: String,
    /// Category for UI grouping
    pub category: NodeCategory,
    /// Description of what the node does
    pub description: String,
    /// Execution mode
    pub execution_mode: ExecutionMode,
}

/// Per-type state payload carried by every node
///
/// Hosts implement this for a closed, tagged enum of node states. The
/// engine only needs the type discriminant; the rest of the shape belongs
/// to the node definitions.
pub trait NodeState:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Type discriminant, matching a registered `NodeMetadata::node_type`
    fn node_type(&self) -> &str;
}

/// Lifecycle status of a node's execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Generating,
    Succeeded,
    Failed,
    Blocked,
}
