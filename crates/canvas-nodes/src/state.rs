//! Node state payloads
//!
//! [`CanvasNode`] is the closed set of node types the canvas supports. Each
//! variant carries the per-type fields the user edits and the results a
//! generation writes back.

use canvas_engine::NodeState;
use serde::{Deserialize, Serialize};

/// State of a single canvas node, tagged by node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CanvasNode {
    TextInput(TextInputNode),
    FileInput(FileInputNode),
    Number(NumberNode),
    Arithmetic(ArithmeticNode),
    Conditional(ConditionalNode),
    ImageGeneration(ImageGenerationNode),
    VideoGeneration(VideoGenerationNode),
    TextGeneration(TextGenerationNode),
}

impl NodeState for CanvasNode {
    fn node_type(&self) -> &str {
        match self {
            Self::TextInput(_) => "textInput",
            Self::FileInput(_) => "fileInput",
            Self::Number(_) => "number",
            Self::Arithmetic(_) => "arithmetic",
            Self::Conditional(_) => "conditional",
            Self::ImageGeneration(_) => "imageGeneration",
            Self::VideoGeneration(_) => "videoGeneration",
            Self::TextGeneration(_) => "textGeneration",
        }
    }
}

/// Free text plus up to [`TextInputNode::MAX_IMAGES`] reference images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextInputNode {
    pub text: String,
    pub images: Vec<String>,
}

impl TextInputNode {
    pub const MAX_IMAGES: usize = 3;

    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    /// Attach a reference image; returns false once the limit is reached
    pub fn add_image(&mut self, url: impl Into<String>) -> bool {
        if self.images.len() >= Self::MAX_IMAGES {
            return false;
        }
        self.images.push(url.into());
        true
    }
}

/// An uploaded file reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileInputNode {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: u64,
}

impl FileInputNode {
    pub fn has_file(&self) -> bool {
        !self.file_url.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberNode {
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOperator {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Binary arithmetic; `a` and `b` are used when the matching sink is unconnected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArithmeticNode {
    pub operator: ArithmeticOperator,
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalNode {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageGenerationNode {
    pub model: String,
    pub mode: String,
    pub quantity: u32,
    pub aspect_ratio: String,
    pub generated_images: Vec<String>,
}

impl ImageGenerationNode {
    pub const DEFAULT_MODEL: &'static str = "seedream";
}

impl Default for ImageGenerationNode {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            mode: "Auto".to_string(),
            quantity: 1,
            aspect_ratio: "1:1".to_string(),
            generated_images: Vec::new(),
        }
    }
}

/// Whether a video is generated from text alone or from a start frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoMode {
    #[default]
    TextToVideo,
    ImageToVideo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoGenerationNode {
    pub model: String,
    pub mode: VideoMode,
    /// Clip length in seconds
    pub duration: u32,
    pub aspect_ratio: String,
    pub generated_video_url: String,
}

impl Default for VideoGenerationNode {
    fn default() -> Self {
        Self {
            model: "runway-gen4".to_string(),
            mode: VideoMode::TextToVideo,
            duration: 5,
            aspect_ratio: "16:9".to_string(),
            generated_video_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextGenerationNode {
    pub model: String,
    /// Used when the `input` sink is unconnected
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub generated_text: String,
}

impl Default for TextGenerationNode {
    fn default() -> Self {
        Self {
            model: "GPT-4o".to_string(),
            prompt: String::new(),
            temperature: 0.7,
            max_tokens: 500,
            generated_text: String::new(),
        }
    }
}
