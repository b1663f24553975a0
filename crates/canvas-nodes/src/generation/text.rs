//! Text Generation Node

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, EngineError, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory,
    NodeDefinition, NodeMetadata, PortAnchor, PortDescriptor, Result,
};
use serde_json::json;

use super::generate;
use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_ROW_HEIGHT_PX, NODE_WIDTH_PX};
use crate::provider::{GenerationKind, GenerationRequest};
use crate::registry::DefinitionFn;
use crate::state::{CanvasNode, TextGenerationNode};
use crate::values::Prompt;

/// Text Generation
///
/// The prompt comes from `input` when connected and from the node's own
/// `prompt` field otherwise.
///
/// # Inputs
/// - `input` (optional) - Prompt
///
/// # Outputs
/// - `output` - Generated text
pub struct TextGenerationDefinition;

impl TextGenerationDefinition {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(TextGenerationDefinition::shared));

#[async_trait]
impl NodeDefinition<CanvasNode> for TextGenerationDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "textGeneration".to_string(),
            title: "Text Generation".to_string(),
            category: NodeCategory::Generation,
            description: "Generates text with a language model".to_string(),
            execution_mode: ExecutionMode::Manual,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::TextGeneration(TextGenerationNode::default())
    }

    fn body_height(&self, state: &CanvasNode) -> f64 {
        let base = NODE_ROW_HEIGHT_PX * 5.0;
        match state {
            CanvasNode::TextGeneration(node) if !node.generated_text.is_empty() => base + 120.0,
            _ => base,
        }
    }

    fn ports(&self, state: &CanvasNode) -> Vec<PortDescriptor> {
        let output_y = NODE_HEADER_HEIGHT_PX + self.body_height(state) - 70.0;
        vec![
            PortDescriptor::sink(
                Self::PORT_INPUT,
                DataKind::Prompt,
                PortAnchor::new(0.0, NODE_HEADER_HEIGHT_PX + 50.0),
            ),
            PortDescriptor::source(
                Self::PORT_OUTPUT,
                DataKind::Text,
                PortAnchor::new(NODE_WIDTH_PX, output_y),
            ),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let CanvasNode::TextGeneration(node) = ctx.state else {
            return Err(EngineError::failed("Text generation node has wrong state"));
        };

        let prompt = match ctx.input(Self::PORT_INPUT) {
            Some(value) => Prompt::from_value(value)?.text,
            None => node.prompt.clone(),
        };
        if prompt.trim().is_empty() {
            return Err(EngineError::failed("Prompt is empty"));
        }

        let request = GenerationRequest::new(GenerationKind::Text, prompt, &node.model)
            .with_param("temperature", json!(node.temperature))
            .with_param("maxTokens", json!(node.max_tokens));

        log::debug!(
            "TextGenerationDefinition {}: requesting up to {} tokens from '{}'",
            ctx.node_id,
            node.max_tokens,
            node.model
        );

        let output = generate(ctx.extensions, request).await?;
        let text = output
            .text
            .ok_or_else(|| EngineError::failed("Provider returned no text"))?;

        Ok(ExecutionResult::new().with_value(Self::PORT_OUTPUT, json!(text)))
    }

    fn apply_result(&self, state: &mut CanvasNode, result: &ExecutionResult) {
        if let (CanvasNode::TextGeneration(node), Some(text)) =
            (state, result.value(Self::PORT_OUTPUT).and_then(|v| v.as_str()))
        {
            node.generated_text = text.to_string();
        }
    }
}
