//! Image Generation Node
//!
//! Sends the connected prompt (and any reference images) to the generation
//! provider and keeps the returned image URLs in its own state.

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, EngineError, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory,
    NodeDefinition, NodeMetadata, PortAnchor, PortDescriptor, Result,
};
use serde_json::json;

use super::generate;
use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_WIDTH_PX};
use crate::provider::{GenerationKind, GenerationRequest};
use crate::registry::DefinitionFn;
use crate::state::{CanvasNode, ImageGenerationNode};
use crate::values::{as_url_list, Prompt};

/// Image Generation
///
/// # Inputs
/// - `prompt` (required) - Prompt text and reference images
/// - `image` (optional) - Additional reference images
/// - `lora` (optional) - Style adapter
///
/// # Outputs
/// - `output` - Generated image URLs
pub struct ImageGenerationDefinition;

impl ImageGenerationDefinition {
    pub const PORT_PROMPT: &'static str = "prompt";
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_LORA: &'static str = "lora";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(ImageGenerationDefinition::shared));

#[async_trait]
impl NodeDefinition<CanvasNode> for ImageGenerationDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "imageGeneration".to_string(),
            title: "Image Generation".to_string(),
            category: NodeCategory::Generation,
            description: "Generates images from a prompt".to_string(),
            execution_mode: ExecutionMode::Manual,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::ImageGeneration(ImageGenerationNode::default())
    }

    fn body_height(&self, _state: &CanvasNode) -> f64 {
        450.0
    }

    fn ports(&self, _state: &CanvasNode) -> Vec<PortDescriptor> {
        let at = |x: f64, offset: f64| PortAnchor::new(x, NODE_HEADER_HEIGHT_PX + offset);
        vec![
            PortDescriptor::sink(Self::PORT_PROMPT, DataKind::Prompt, at(0.0, 80.0)).required(),
            PortDescriptor::sink(Self::PORT_IMAGE, DataKind::ImageList, at(0.0, 140.0)),
            PortDescriptor::sink(Self::PORT_LORA, DataKind::Any, at(0.0, 200.0)),
            PortDescriptor::source(Self::PORT_OUTPUT, DataKind::ImageList, at(NODE_WIDTH_PX, 140.0)),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let CanvasNode::ImageGeneration(node) = ctx.state else {
            return Err(EngineError::failed("Image generation node has wrong state"));
        };

        let prompt = Prompt::from_value(ctx.require_input(Self::PORT_PROMPT)?)?;
        if prompt.is_empty() {
            return Err(EngineError::failed("Prompt is empty"));
        }

        let mut reference_images = prompt.images;
        if let Some(images) = ctx.input(Self::PORT_IMAGE) {
            reference_images.extend(as_url_list(images));
        }

        let mut request = GenerationRequest::new(GenerationKind::Image, prompt.text, &node.model)
            .with_param("mode", json!(node.mode))
            .with_param("quantity", json!(node.quantity))
            .with_param("aspectRatio", json!(node.aspect_ratio))
            .with_reference_images(reference_images);
        if let Some(lora) = ctx.input(Self::PORT_LORA) {
            request = request.with_param("lora", lora.clone());
        }

        log::debug!(
            "ImageGenerationDefinition {}: requesting {} image(s) from '{}'",
            ctx.node_id,
            node.quantity,
            node.model
        );

        let output = generate(ctx.extensions, request).await?;
        if output.urls.is_empty() {
            return Err(EngineError::failed("Provider returned no images"));
        }

        Ok(ExecutionResult::new().with_value(Self::PORT_OUTPUT, json!(output.urls)))
    }

    fn apply_result(&self, state: &mut CanvasNode, result: &ExecutionResult) {
        if let (CanvasNode::ImageGeneration(node), Some(urls)) =
            (state, result.value(Self::PORT_OUTPUT))
        {
            node.generated_images = as_url_list(urls);
        }
    }

    fn on_port_disconnect(&self, state: &mut CanvasNode, port_id: &str) {
        if let (CanvasNode::ImageGeneration(node), Self::PORT_PROMPT) = (state, port_id) {
            node.model = ImageGenerationNode::DEFAULT_MODEL.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{extensions_with, run, RecordingProvider};
    use canvas_engine::ExecutorExtensions;

    fn state() -> CanvasNode {
        ImageGenerationDefinition.default_state()
    }

    #[tokio::test]
    async fn test_generates_from_prompt() {
        let provider = RecordingProvider::with_urls(&["https://out/1.png"]);
        let result = run(
            &ImageGenerationDefinition,
            &state(),
            &[
                ("prompt", json!({"text": "a cat", "images": ["https://ref/a.png"]})),
                ("image", json!(["https://ref/b.png"])),
            ],
            &extensions_with(provider.clone()),
        )
        .await
        .unwrap();

        assert_eq!(result.value("output"), Some(&json!(["https://out/1.png"])));

        let request = provider.last_request();
        assert_eq!(request.kind, GenerationKind::Image);
        assert_eq!(request.prompt, "a cat");
        assert_eq!(request.model, "seedream");
        assert_eq!(request.reference_images.len(), 2);
        assert_eq!(request.params["aspectRatio"], "1:1");
    }

    #[tokio::test]
    async fn test_requires_prompt() {
        let provider = RecordingProvider::with_urls(&["https://out/1.png"]);
        let err = run(&ImageGenerationDefinition, &state(), &[], &extensions_with(provider))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingInput(_)));

        let provider = RecordingProvider::with_urls(&["https://out/1.png"]);
        let err = run(
            &ImageGenerationDefinition,
            &state(),
            &[("prompt", json!("  "))],
            &extensions_with(provider),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Prompt is empty"));
    }

    #[tokio::test]
    async fn test_fails_without_provider() {
        let err = run(
            &ImageGenerationDefinition,
            &state(),
            &[("prompt", json!("a cat"))],
            &ExecutorExtensions::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("No generation provider configured"));
    }

    #[test]
    fn test_apply_result_and_disconnect_hook() {
        let def = ImageGenerationDefinition;
        let mut state = state();
        if let CanvasNode::ImageGeneration(node) = &mut state {
            node.model = "flux".to_string();
        }

        let result = ExecutionResult::new().with_value("output", json!(["u1", "u2"]));
        def.apply_result(&mut state, &result);
        def.on_port_disconnect(&mut state, "image");

        let CanvasNode::ImageGeneration(node) = &state else {
            panic!("expected image generation state");
        };
        assert_eq!(node.generated_images, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(node.model, "flux");

        def.on_port_disconnect(&mut state, "prompt");
        let CanvasNode::ImageGeneration(node) = &state else {
            panic!("expected image generation state");
        };
        assert_eq!(node.model, ImageGenerationNode::DEFAULT_MODEL);
    }
}
