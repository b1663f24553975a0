//! Built-in node registry
//!
//! Every node module submits its definition at link time:
//!
//! ```ignore
//! inventory::submit!(crate::registry::DefinitionFn(NumberDefinition::shared));
//! ```
//!
//! [`builtin_registry`] collects the submissions once per process.

use std::sync::Arc;

use canvas_engine::{NodeDefinition, NodeRegistry};
use once_cell::sync::Lazy;

use crate::state::CanvasNode;

/// Constructor for a built-in node definition
pub struct DefinitionFn(pub fn() -> Arc<dyn NodeDefinition<CanvasNode>>);

inventory::collect!(DefinitionFn);

static BUILTINS: Lazy<Arc<NodeRegistry<CanvasNode>>> = Lazy::new(|| {
    let mut registry = NodeRegistry::new();
    for entry in inventory::iter::<DefinitionFn> {
        registry.register((entry.0)());
    }
    log::info!("Registered {} built-in node types", registry.len());
    Arc::new(registry)
});

/// Registry holding every built-in node type
pub fn builtin_registry() -> Arc<NodeRegistry<CanvasNode>> {
    BUILTINS.clone()
}
