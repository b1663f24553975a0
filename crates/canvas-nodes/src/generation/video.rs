//! Video Generation Node
//!
//! Generates a clip from a prompt, a start frame, or both. Connecting an
//! image switches the node into image-to-video mode; disconnecting it
//! switches back.

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
use crate::state::{CanvasNode, VideoGenerationNode, VideoMode};
use crate::values::{as_url_list, Prompt};

const CONTROLS_HEIGHT_PX: f64 = 280.0;
const PREVIEW_PLACEHOLDER_HEIGHT_PX: f64 = 50.0;
const PREVIEW_HEIGHT_PX: f64 = 140.0;

/// Video Generation
///
/// # Inputs
/// - `prompt` (optional) - Prompt text
/// - `image` (optional) - Start frame; the first URL is used
/// - `video` (optional) - Source clip to restyle or extend
///
/// # Outputs
/// - `output` - URL of the generated clip
pub struct VideoGenerationDefinition;

impl VideoGenerationDefinition {
    pub const PORT_PROMPT: &'static str = "prompt";
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_VIDEO: &'static str = "video";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(VideoGenerationDefinition::shared));

#[async_trait]
impl NodeDefinition<CanvasNode> for VideoGenerationDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "videoGeneration".to_string(),
            title: "Video Generation".to_string(),
            category: NodeCategory::Generation,
            description: "Generates a video from a prompt or a start frame".to_string(),
            execution_mode: ExecutionMode::Manual,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::VideoGeneration(VideoGenerationNode::default())
    }

    fn body_height(&self, state: &CanvasNode) -> f64 {
        match state {
            CanvasNode::VideoGeneration(node) if !node.generated_video_url.is_empty() => {
                CONTROLS_HEIGHT_PX + PREVIEW_HEIGHT_PX
            }
            _ => CONTROLS_HEIGHT_PX + PREVIEW_PLACEHOLDER_HEIGHT_PX,
        }
    }

    fn ports(&self, _state: &CanvasNode) -> Vec<PortDescriptor> {
        let at = |x: f64, offset: f64| PortAnchor::new(x, NODE_HEADER_HEIGHT_PX + offset);
        vec![
            PortDescriptor::sink(Self::PORT_PROMPT, DataKind::Prompt, at(0.0, 80.0)),
            PortDescriptor::sink(Self::PORT_IMAGE, DataKind::ImageList, at(0.0, 140.0)),
            PortDescriptor::sink(Self::PORT_VIDEO, DataKind::Video, at(0.0, 200.0)),
            PortDescriptor::source(Self::PORT_OUTPUT, DataKind::Video, at(NODE_WIDTH_PX, 140.0)),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let CanvasNode::VideoGeneration(node) = ctx.state else {
            return Err(EngineError::failed("Video generation node has wrong state"));
        };

        let prompt = match ctx.input(Self::PORT_PROMPT) {
            Some(value) => Prompt::from_value(value)?,
            None => Prompt::default(),
        };
        let mut frames = prompt.images.clone();
        if let Some(images) = ctx.input(Self::PORT_IMAGE) {
            frames = as_url_list(images).into_iter().chain(frames).collect();
        }
        let start_frame: Vec<String> = frames.into_iter().take(1).collect();

        if prompt.is_empty() && start_frame.is_empty() {
            return Err(EngineError::failed(
                "Video generation needs a prompt or an image",
            ));
        }

        let mut request = GenerationRequest::new(GenerationKind::Video, prompt.text, &node.model)
            .with_param("mode", json!(node.mode))
            .with_param("duration", json!(node.duration))
            .with_param("aspectRatio", json!(node.aspect_ratio))
            .with_reference_images(start_frame);
        if let Some(video) = ctx.input(Self::PORT_VIDEO).and_then(|v| v.as_str()) {
            request = request.with_param("videoUrl", json!(video));
        }

        log::debug!(
            "VideoGenerationDefinition {}: requesting {}s {:?} clip from '{}'",
            ctx.node_id,
            node.duration,
            node.mode,
            node.model
        );

        let output = generate(ctx.extensions, request).await?;
        let url = output
            .urls
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::failed("Provider returned no video"))?;

        Ok(ExecutionResult::new().with_value(Self::PORT_OUTPUT, json!(url)))
    }

    fn apply_result(&self, state: &mut CanvasNode, result: &ExecutionResult) {
        if let (CanvasNode::VideoGeneration(node), Some(url)) =
            (state, result.value(Self::PORT_OUTPUT).and_then(|v| v.as_str()))
        {
            node.generated_video_url = url.to_string();
        }
    }

    fn on_port_connect(&self, state: &mut CanvasNode, port_id: &str) {
        if let (CanvasNode::VideoGeneration(node), Self::PORT_IMAGE) = (state, port_id) {
            node.mode = VideoMode::ImageToVideo;
        }
    }

    fn on_port_disconnect(&self, state: &mut CanvasNode, port_id: &str) {
        if let (CanvasNode::VideoGeneration(node), Self::PORT_IMAGE) = (state, port_id) {
            node.mode = VideoMode::TextToVideo;
        }
    }
}
