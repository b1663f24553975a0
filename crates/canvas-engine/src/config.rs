//! Engine policy configuration

use serde::{Deserialize, Serialize};

/// What happens to direct consumers after a node succeeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Consumers stay stale until someone runs them
    #[default]
    Manual,
    /// Consumers are scheduled for execution in the background
    Auto,
}

/// Policy knobs for a [`FlowEngine`](crate::FlowEngine)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Re-run policy for consumers of a node that just succeeded
    pub cascade: CascadePolicy,
    /// Schedule the sink node for execution after every successful connect
    pub auto_run_on_connect: bool,
    /// Invalidate consumers even when a re-run produced identical outputs
    pub propagate_unchanged_results: bool,
}

impl EngineConfig {
    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_auto_run_on_connect(mut self, enabled: bool) -> Self {
        self.auto_run_on_connect = enabled;
        self
    }

    pub fn with_propagate_unchanged_results(mut self, enabled: bool) -> Self {
        self.propagate_unchanged_results = enabled;
        self
    }
}
