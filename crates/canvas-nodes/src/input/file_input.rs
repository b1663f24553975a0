//! File Input Node
//!
//! Exposes an uploaded file reference. Fails until a file has been set.

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, EngineError, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory,
    NodeDefinition, NodeMetadata, PortAnchor, PortDescriptor, Result,
};
use serde_json::json;

use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_WIDTH_PX};
use crate::registry::DefinitionFn;
use crate::state::{CanvasNode, FileInputNode};

/// File Input
///
/// # Outputs
/// - `output` - `{ "fileName", "fileUrl", "fileType", "fileSize" }`
pub struct FileInputDefinition;

impl FileInputDefinition {
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(FileInputDefinition::shared));

#[async_trait]
impl NodeDefinition<CanvasNode> for FileInputDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "fileInput".to_string(),
            title: "File Input".to_string(),
            category: NodeCategory::Input,
            description: "Provides an uploaded file".to_string(),
            execution_mode: ExecutionMode::Reactive,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::FileInput(FileInputNode::default())
    }

    fn body_height(&self, _state: &CanvasNode) -> f64 {
        360.0
    }

    fn ports(&self, _state: &CanvasNode) -> Vec<PortDescriptor> {
        vec![PortDescriptor::source(
            Self::PORT_OUTPUT,
            DataKind::File,
            PortAnchor::new(NODE_WIDTH_PX, NODE_HEADER_HEIGHT_PX + 30.0),
        )]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let CanvasNode::FileInput(file) = ctx.state else {
            return Err(EngineError::failed("File input node has wrong state"));
        };
        if !file.has_file() {
            return Err(EngineError::failed("No file selected"));
        }

        log::debug!(
            "FileInputDefinition {}: providing '{}' ({} bytes)",
            ctx.node_id,
            file.file_name,
            file.file_size
        );

        Ok(ExecutionResult::new().with_value(Self::PORT_OUTPUT, json!(file)))
    }
}
