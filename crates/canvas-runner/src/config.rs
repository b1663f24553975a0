//! Runner configuration
//!
//! Read from a JSON file; a missing file means defaults. The backend URL
//! and API key can be overridden from the environment so secrets need not
//! live in the file.

use std::path::Path;
use std::time::Duration;

use canvas_engine::EngineConfig;
use canvas_nodes::HttpGenerationProvider;
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const ENV_BACKEND_URL: &str = "CANVAS_BACKEND_URL";
pub const ENV_BACKEND_API_KEY: &str = "CANVAS_BACKEND_API_KEY";

/// Generation back-end settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            project_id: None,
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
        }
    }
}

impl ProviderConfig {
    pub fn build(&self) -> HttpGenerationProvider {
        let mut provider = HttpGenerationProvider::new(&self.base_url)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_max_attempts(self.max_poll_attempts);
        if let Some(key) = &self.api_key {
            provider = provider.with_api_key(key);
        }
        if let Some(project_id) = &self.project_id {
            provider = provider.with_project_id(project_id);
        }
        provider
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    pub engine: EngineConfig,
    pub provider: ProviderConfig,
}

impl RunnerConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;
                serde_json::from_str(&contents).map_err(ConfigError::Parse)?
            }
            Some(path) => {
                log::info!("No config at {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.is_empty()) {
            log::debug!("Backend URL overridden by {}", ENV_BACKEND_URL);
            self.provider.base_url = url;
        }
        if let Some(key) = lookup(ENV_BACKEND_API_KEY).filter(|v| !v.is_empty()) {
            self.provider.api_key = Some(key);
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
}
