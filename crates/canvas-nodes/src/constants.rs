//! Layout constants shared by every node type
//!
//! Port anchors are expressed relative to the node's top-left corner. Sinks
//! sit on the left edge (`x = 0`), sources on the right (`x = NODE_WIDTH_PX`).

pub const NODE_WIDTH_PX: f64 = 320.0;
pub const NODE_HEADER_HEIGHT_PX: f64 = 40.0;
pub const NODE_ROW_HEIGHT_PX: f64 = 40.0;

/// Keys for services injected through `ExecutorExtensions`
pub mod extension_keys {
    /// `Arc<dyn GenerationProvider>` used by all generation nodes
    pub const GENERATION_PROVIDER: &str = "generation_provider";
}
