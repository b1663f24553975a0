//! Text Input Node
//!
//! Provides user-entered text, plus up to three reference images, as a
//! prompt. The body grows with the number of text lines and image rows, and
//! the output anchor follows it.

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, EngineError, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory,
    NodeDefinition, NodeMetadata, PortAnchor, PortDescriptor, Result,
};
use serde_json::json;

use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_WIDTH_PX};
use crate::registry::DefinitionFn;
use crate::state::{CanvasNode, TextInputNode};

const LINE_HEIGHT_PX: f64 = 20.0;
const IMAGE_ROW_HEIGHT_PX: f64 = 90.0;
const IMAGES_PER_ROW: usize = 3;

/// Text Input
///
/// # Outputs
/// - `output` - `{ "text": String, "images": [String] }`
pub struct TextInputDefinition;

impl TextInputDefinition {
    /// Port ID for the prompt output
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(TextInputDefinition::shared));

fn text_input(state: &CanvasNode) -> Option<&TextInputNode> {
    match state {
        CanvasNode::TextInput(node) => Some(node),
        _ => None,
    }
}

#[async_trait]
impl NodeDefinition<CanvasNode> for TextInputDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "textInput".to_string(),
            title: "Text Input".to_string(),
            category: NodeCategory::Input,
            description: "Provides prompt text and reference images".to_string(),
            execution_mode: ExecutionMode::Reactive,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::TextInput(TextInputNode::default())
    }

    fn body_height(&self, state: &CanvasNode) -> f64 {
        let Some(node) = text_input(state) else {
            return 0.0;
        };
        let lines = node.text.split('\n').count() as f64;
        let text_height = (lines * LINE_HEIGHT_PX + 40.0).clamp(80.0, 300.0);
        let image_height = if node.images.is_empty() {
            0.0
        } else {
            let rows = node.images.len().div_ceil(IMAGES_PER_ROW) as f64;
            rows * IMAGE_ROW_HEIGHT_PX + 8.0
        };
        text_height + 60.0 + image_height
    }

    fn ports(&self, state: &CanvasNode) -> Vec<PortDescriptor> {
        let y = NODE_HEADER_HEIGHT_PX + self.body_height(state) * 0.4;
        vec![PortDescriptor::source(
            Self::PORT_OUTPUT,
            DataKind::Prompt,
            PortAnchor::new(NODE_WIDTH_PX, y),
        )]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let node = text_input(ctx.state)
            .ok_or_else(|| EngineError::failed("Text input node has wrong state"))?;

        log::debug!(
            "TextInputDefinition {}: providing {} chars and {} images",
            ctx.node_id,
            node.text.len(),
            node.images.len()
        );

        Ok(ExecutionResult::new().with_value(
            Self::PORT_OUTPUT,
            json!({ "text": node.text, "images": node.images }),
        ))
    }
}
