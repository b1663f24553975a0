//! Event types for notifying collaborators
//!
//! The engine reports every graph mutation and execution transition through
//! an [`EventSink`]. A canvas host re-renders from these; a test collects
//! them with [`VecEventSink`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{Connection, ExecutionResult, NodeId};

/// Trait for sending engine events
///
/// This abstracts over the transport mechanism (UI bridge, mpsc, etc.)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A node was instantiated
    #[serde(rename_all = "camelCase")]
    NodeCreated { node_id: NodeId, node_type: String },

    /// A node and its incident connections were removed
    #[serde(rename_all = "camelCase")]
    NodeRemoved {
        node_id: NodeId,
        connections: Vec<Connection>,
    },

    /// A node's own fields were edited (or rewritten by a hook)
    #[serde(rename_all = "camelCase")]
    NodeStateChanged { node_id: NodeId },

    /// A connection was added
    Connected { connection: Connection },

    /// A connection was removed
    Disconnected { connection: Connection },

    /// Nodes whose `is_out_of_date` flag flipped to true
    #[serde(rename_all = "camelCase")]
    NodesInvalidated { node_ids: Vec<NodeId> },

    /// A node's compute function was invoked
    #[serde(rename_all = "camelCase")]
    NodeStarted { node_id: NodeId },

    /// A node's compute function succeeded
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: NodeId,
        outputs: ExecutionResult,
        /// False when the inputs changed while the computation was in flight
        up_to_date: bool,
    },

    /// A node's compute function failed
    #[serde(rename_all = "camelCase")]
    NodeFailed { node_id: NodeId, error: String },

    /// Nodes short-circuited by an upstream stop signal
    #[serde(rename_all = "camelCase")]
    NodesBlocked { node_ids: Vec<NodeId> },

    /// A result arrived for a node that no longer exists
    #[serde(rename_all = "camelCase")]
    ResultDiscarded { node_id: NodeId },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError {
                message: "Event buffer poisoned".to_string(),
            })?
            .push(event);
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEventSink {
    /// Create a sink together with the receiving half
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}
