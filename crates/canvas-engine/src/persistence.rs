//! Serializable graph layout
//!
//! A snapshot holds node identities, types, state and the connection
//! endpoint pairs. Restoring one goes through
//! [`validate_snapshot`](crate::validation::validate_snapshot), so a
//! round-trip can never smuggle a cycle or a doubly-bound sink into the
//! engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{GraphState, NodeRecord};
use crate::types::{Connection, NodeState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot<S> {
    pub nodes: Vec<NodeRecord<S>>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl<S: NodeState> GraphSnapshot<S> {
    /// Capture the current graph
    ///
    /// In-flight executions are recorded as not generating; the work they
    /// represent cannot survive a save/restore.
    pub fn capture(graph: &GraphState<S>) -> Self {
        Self {
            nodes: graph
                .nodes()
                .cloned()
                .map(|mut node| {
                    node.is_generating = false;
                    node
                })
                .collect(),
            connections: graph.connections().connections(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a snapshot from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&content)
    }

    /// Write this snapshot to a JSON file, creating parent directories
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.to_json()?).await?;
        log::debug!("Saved graph snapshot ({} nodes) to {:?}", self.nodes.len(), path);
        Ok(())
    }
}

impl<S> Default for GraphSnapshot<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }
}
