//! Canvas Nodes
//!
//! Built-in node types for the canvas engine. Every node type is one
//! variant of [`CanvasNode`] plus one [`NodeDefinition`](canvas_engine::NodeDefinition)
//! submitted to the link-time registry.
//!
//! # Categories
//!
//! - **Input**: text, file and number nodes whose value comes from the user
//! - **Math**: arithmetic on numbers
//! - **Control**: conditional routing
//! - **Generation**: image, video and text generation through a
//!   [`GenerationProvider`]
//!
//! # Example
//!
//! ```ignore
//! let provider: Arc<dyn GenerationProvider> =
//!     Arc::new(HttpGenerationProvider::new("http://localhost:8000"));
//! let extensions = ExecutorExtensions::new()
//!     .with(extension_keys::GENERATION_PROVIDER, provider);
//! let engine = FlowEngine::new(canvas_nodes::builtin_registry(), EngineConfig::default())
//!     .with_extensions(extensions);
//! ```

pub mod constants;
pub mod control;
pub mod generation;
pub mod input;
pub mod math;
pub mod provider;
pub mod registry;
pub mod state;
pub mod values;

#[cfg(test)]
mod testing;

pub use constants::extension_keys;
pub use control::*;
pub use generation::*;
pub use input::*;
pub use math::*;
pub use provider::{
    GenerationKind, GenerationOutput, GenerationProvider, GenerationRequest,
    HttpGenerationProvider, ProviderError,
};
pub use registry::{builtin_registry, DefinitionFn};
pub use state::*;
