//! Typed extension map for non-serializable dependency injection.
//!
//! Hosts put runtime services (generation provider clients, project
//! handles) into an `ExecutorExtensions` once, and the engine hands the same
//! map to every node definition's `execute`.
//!
//! ```ignore
//! let mut ext = ExecutorExtensions::new();
//! ext.set("generation_provider", provider);
//!
//! // In a NodeDefinition:
//! let provider = ctx.extensions.get::<Arc<dyn GenerationProvider>>("generation_provider");
//! ```

use std::any::Any;
use std::collections::HashMap;

/// Typed extension map keyed by string
pub struct ExecutorExtensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutorExtensions {
    /// Create an empty extension map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a typed value under the given key, replacing any previous one.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with<T: Send + Sync + 'static>(mut self, key: &str, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Get a reference to a typed value by key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

impl Default for ExecutorExtensions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutorExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorExtensions")
            .field("keys", &self.inner.keys().collect::<Vec<_>>())
            .finish()
    }
}
