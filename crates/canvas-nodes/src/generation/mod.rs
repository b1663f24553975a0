//! Generation nodes
//!
//! Expensive nodes backed by a [`GenerationProvider`]. They run only when
//! asked to; a stale generation node blocks its consumers instead of being
//! re-run on demand.

mod image;
mod text;
mod video;

pub use image::ImageGenerationDefinition;
pub use text::TextGenerationDefinition;
pub use video::VideoGenerationDefinition;

use std::sync::Arc;

use canvas_engine::{EngineError, ExecutorExtensions, Result};

use crate::constants::extension_keys;
use crate::provider::{GenerationOutput, GenerationProvider, GenerationRequest, ProviderError};

/// Submit a request to the injected provider
async fn generate(
    extensions: &ExecutorExtensions,
    request: GenerationRequest,
) -> Result<GenerationOutput> {
    let provider = extensions
        .get::<Arc<dyn GenerationProvider>>(extension_keys::GENERATION_PROVIDER)
        .ok_or_else(|| EngineError::failed(ProviderError::NotConfigured.to_string()))?;

    provider
        .generate(request)
        .await
        .map_err(|e| EngineError::failed(e.to_string()))
}
