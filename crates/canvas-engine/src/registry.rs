//! Node type registry
//!
//! Maps node type strings to their [`NodeDefinition`]. A registry is built
//! once at startup and then shared read-only (behind an `Arc`) by the engine;
//! there is no runtime registration or removal.
//!
//! ```ignore
//! let mut registry = NodeRegistry::new();
//! registry.register(Arc::new(TextInputDefinition));
//! let engine = FlowEngine::new(Arc::new(registry), EngineConfig::default());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::NodeDefinition;
use crate::error::{EngineError, Result};
use crate::types::{NodeCategory, NodeMetadata, NodeState};

/// A registration entry combining cached metadata with the definition
struct RegistryEntry<S: NodeState> {
    metadata: NodeMetadata,
    definition: Arc<dyn NodeDefinition<S>>,
}

/// Registry of node types
pub struct NodeRegistry<S: NodeState> {
    entries: HashMap<String, RegistryEntry<S>>,
}

impl<S: NodeState> NodeRegistry<S> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a node definition under its metadata's `node_type`
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, definition: Arc<dyn NodeDefinition<S>>) {
        let metadata = definition.metadata();
        log::debug!("Registering node type '{}'", metadata.node_type);
        self.entries.insert(
            metadata.node_type.clone(),
            RegistryEntry {
                metadata,
                definition,
            },
        );
    }

    /// Get the definition for a node type
    pub fn get(&self, node_type: &str) -> Result<Arc<dyn NodeDefinition<S>>> {
        self.entries
            .get(node_type)
            .map(|e| e.definition.clone())
            .ok_or_else(|| EngineError::NodeTypeNotFound(node_type.to_string()))
    }

    /// Default state for a fresh node of this type
    pub fn default_state(&self, node_type: &str) -> Result<S> {
        Ok(self.get(node_type)?.default_state())
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<&NodeMetadata> {
        self.entries.get(node_type).map(|e| &e.metadata)
    }

    /// Get all registered metadata
    pub fn all_metadata(&self) -> Vec<&NodeMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Get metadata grouped by category
    pub fn metadata_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeMetadata>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeMetadata>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }
        grouped
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: NodeState> Default for NodeRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
