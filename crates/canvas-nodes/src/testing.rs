//! Helpers for node unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use canvas_engine::{
    ExecutionContext, ExecutionResult, ExecutorExtensions, InputValues, NodeDefinition, Result,
};

use crate::constants::extension_keys;
use crate::provider::{GenerationOutput, GenerationProvider, GenerationRequest, ProviderError};
use crate::state::CanvasNode;

/// Invoke a definition's compute function directly
pub(crate) async fn run(
    definition: &dyn NodeDefinition<CanvasNode>,
    state: &CanvasNode,
    inputs: &[(&str, serde_json::Value)],
    extensions: &ExecutorExtensions,
) -> Result<ExecutionResult> {
    let inputs: InputValues = inputs
        .iter()
        .map(|(port, value)| (port.to_string(), value.clone()))
        .collect();
    definition
        .execute(ExecutionContext {
            node_id: "test",
            state,
            inputs: &inputs,
            extensions,
        })
        .await
}

/// Provider that records requests and answers with a fixed output
#[derive(Default)]
pub(crate) struct RecordingProvider {
    pub output: GenerationOutput,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingProvider {
    pub fn with_urls(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            output: GenerationOutput {
                urls: urls.iter().map(|u| u.to_string()).collect(),
                text: None,
            },
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            output: GenerationOutput {
                urls: Vec::new(),
                text: Some(text.to_string()),
            },
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_request(&self) -> GenerationRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl GenerationProvider for RecordingProvider {
    async fn generate(&self, request: GenerationRequest) -> std::result::Result<GenerationOutput, ProviderError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.output.clone())
    }
}

pub(crate) fn extensions_with(provider: Arc<RecordingProvider>) -> ExecutorExtensions {
    let provider: Arc<dyn GenerationProvider> = provider;
    ExecutorExtensions::new().with(extension_keys::GENERATION_PROVIDER, provider)
}
