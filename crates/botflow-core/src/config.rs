use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::types::Limits;

/// Top-level Botflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FlowError::ConfigNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| FlowError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Loop-guard ceiling on visits to a single node.
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: u32,
    /// Loop-guard ceiling on total dispatched steps per run.
    #[serde(default = "default_max_total_steps")]
    pub max_total_steps: u32,
    /// Default timeout for REST steps, overridable per node.
    #[serde(default = "default_rest_timeout")]
    pub rest_timeout_secs: u64,
}

impl EngineConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_node_visits: self.max_node_visits,
            max_total_steps: self.max_total_steps,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_node_visits: default_max_node_visits(),
            max_total_steps: default_max_total_steps(),
            rest_timeout_secs: default_rest_timeout(),
        }
    }
}

fn default_max_node_visits() -> u32 {
    10
}

fn default_max_total_steps() -> u32 {
    100
}

fn default_rest_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "botflow.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// Outbound webhook sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL messages are POSTed to as JSON.
    pub url: String,
    /// Optional bearer token for the Authorization header.
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.max_node_visits, 10);
        assert_eq!(config.engine.max_total_steps, 100);
        assert_eq!(config.engine.rest_timeout_secs, 30);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [engine]
            max_node_visits = 3

            [webhook]
            url = "https://hooks.example.com/botflow"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.engine.max_node_visits, 3);
        assert_eq!(config.engine.max_total_steps, 100);
        assert_eq!(
            config.webhook.unwrap().url,
            "https://hooks.example.com/botflow"
        );
    }
}
