//! Canvas Engine - dataflow runtime for canvas node graphs
//!
//! This crate provides the graph engine behind the canvas editor: typed
//! nodes wired port-to-port into an acyclic graph, with staleness tracking
//! and async execution. It supports:
//!
//! - Per-type node definitions with state-dependent ports and lifecycle hooks
//! - Single-producer, cycle-free connections checked at the moment of the edit
//! - Forward staleness propagation with a stop sentinel for unready inputs
//! - At-most-one concurrent execution per node, tolerant of mid-flight edits
//! - Snapshot persistence with validation, and compressed undo/redo
//!
//! The crate knows nothing about concrete node types. Hosts supply a closed
//! [`NodeState`] enum and register one [`NodeDefinition`] per variant.
//!
//! # Architecture
//!
//! - [`FlowEngine`]: owns the graph and serializes every mutation
//! - [`NodeRegistry`]: maps type names to definitions
//! - [`ConnectionGraph`]: edges keyed by `(node, port)`
//! - [`staleness`]: forward invalidation and blocking
//! - [`EventSink`]: notification of collaborators (renderer, logs, tests)
//!
//! # Example
//!
//! ```ignore
//! use canvas_engine::{EngineConfig, FlowEngine, PortRef};
//!
//! let engine = FlowEngine::new(registry, EngineConfig::default());
//! engine.create_node("t", "textInput").await?;
//! engine.create_node("g", "imageGeneration").await?;
//! engine.connect(PortRef::new("t", "output"), PortRef::new("g", "prompt")).await?;
//! engine.execute("g").await?;
//! ```

pub mod config;
pub mod connections;
pub mod definition;
pub mod engine;
pub mod error;
pub mod events;
pub mod extensions;
pub mod graph;
pub mod persistence;
pub mod registry;
pub mod staleness;
pub mod types;
pub mod undo;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-export key types
pub use config::{CascadePolicy, EngineConfig};
pub use connections::ConnectionGraph;
pub use definition::{ExecutionContext, NodeDefinition};
pub use engine::{ExecutionOutcome, FlowEngine, InputInfo};
pub use error::{EngineError, Result};
pub use events::{
    ChannelEventSink, EngineEvent, EventError, EventSink, NullEventSink, VecEventSink,
};
pub use extensions::ExecutorExtensions;
pub use graph::{GraphState, NodeRecord};
pub use persistence::GraphSnapshot;
pub use registry::NodeRegistry;
pub use types::{
    Connection, DataKind, ExecutionMode, ExecutionResult, ExecutionStatus, InputValues,
    NodeCategory, NodeId, NodeMetadata, NodeState, PortAnchor, PortDescriptor, PortDirection,
    PortId, PortRef, PortValue,
};
pub use undo::UndoStack;
pub use validation::{validate_snapshot, ValidationError};
