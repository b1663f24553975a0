//! Helpers for reading port values
//!
//! Values crossing connections are plain JSON. A prompt is either a bare
//! string (from a text generator) or `{ "text", "images" }` (from a text
//! input).

use canvas_engine::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prompt text with optional reference images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompt {
    pub text: String,
    pub images: Vec<String>,
}

impl Prompt {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self {
                text: text.clone(),
                images: Vec::new(),
            }),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| EngineError::failed(format!("Invalid prompt: {}", e))),
            other => Err(EngineError::failed(format!(
                "Expected a prompt, got {}",
                other
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub fn as_number(value: &Value, port: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| EngineError::failed(format!("Input '{}' is not a number", port)))
}

pub fn as_bool(value: &Value, port: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| EngineError::failed(format!("Input '{}' is not a boolean", port)))
}

/// A single URL or a list of URLs
pub fn as_url_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(url) if !url.is_empty() => vec![url.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
