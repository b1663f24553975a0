//! Error types for the canvas engine

use thiserror::Error;

use crate::types::{DataKind, NodeId, PortId};
use crate::validation::ValidationError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the canvas engine
///
/// Structural errors (`NodeTypeNotFound` through `TypeChanged`) are
/// returned before the graph is touched. Execution errors leave the node's
/// last good output in place.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No node definition registered under this type name
    #[error("Node type not found: {0}")]
    NodeTypeNotFound(String),

    /// No node with this id exists in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node with this id already exists
    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    /// The node has no port with this id
    #[error("Port '{port_id}' not found on node '{node_id}'")]
    PortNotFound { node_id: NodeId, port_id: PortId },

    /// A source endpoint was given a sink port, or the other way round
    #[error("Port '{port_id}' on node '{node_id}' cannot be used as a {expected}")]
    PortDirectionMismatch {
        node_id: NodeId,
        port_id: PortId,
        expected: String,
    },

    /// The two ports carry incompatible data
    #[error("Incompatible data kinds: {source_kind:?} -> {sink_kind:?}")]
    IncompatibleDataKind {
        source_kind: DataKind,
        sink_kind: DataKind,
    },

    /// The sink port already has a producer
    #[error("Sink '{node_id}.{port_id}' already has an incoming connection")]
    SinkAlreadyBound { node_id: NodeId, port_id: PortId },

    /// The connection would close a cycle
    #[error("Connecting '{source_node}' to '{sink_node}' would create a cycle")]
    CycleDetected { source_node: NodeId, sink_node: NodeId },

    /// No such connection exists
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// An edit tried to turn a node into a different type
    #[error("Node '{node_id}' cannot change type from '{from}' to '{to}'")]
    TypeChanged {
        node_id: NodeId,
        from: String,
        to: String,
    },

    /// Missing required input
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// A node's compute step failed
    #[error("Execution of '{node_id}' failed: {message}")]
    ExecutionFailed { node_id: NodeId, message: String },

    /// A persisted graph did not pass validation
    #[error("Invalid snapshot: {}", format_validation(.0))]
    InvalidSnapshot(Vec<ValidationError>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create an execution failed error with a message
    ///
    /// The node id is filled in by the engine when the error crosses the
    /// definition boundary.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            node_id: String::new(),
            message: msg.into(),
        }
    }

    /// Whether this error was raised before any graph mutation
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::NodeTypeNotFound(_)
                | Self::NodeNotFound(_)
                | Self::DuplicateNode(_)
                | Self::PortNotFound { .. }
                | Self::PortDirectionMismatch { .. }
                | Self::IncompatibleDataKind { .. }
                | Self::SinkAlreadyBound { .. }
                | Self::CycleDetected { .. }
                | Self::ConnectionNotFound(_)
                | Self::TypeChanged { .. }
        )
    }

    /// Attach the failing node's id to an execution error
    pub(crate) fn for_node(self, node_id: &str) -> Self {
        match self {
            Self::ExecutionFailed { message, .. } => Self::ExecutionFailed {
                node_id: node_id.to_string(),
                message,
            },
            other => Self::ExecutionFailed {
                node_id: node_id.to_string(),
                message: other.to_string(),
            },
        }
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
