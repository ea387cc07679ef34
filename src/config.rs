//! Configuration for the mock server.
//!
//! Defines server settings and the endpoints registered at startup.

use crate::endpoint::{Attributes, EndpointInput};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Built-in configuration used when no config file is present.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default-config.yaml");

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Server settings
    #[serde(default)]
    pub settings: ServerSettings,

    /// Endpoints registered at startup
    #[serde(default)]
    pub endpoints: Vec<Attributes>,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in configuration.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_yaml(DEFAULT_CONFIG)
            .map_err(|e| anyhow::anyhow!("Built-in configuration is invalid: {}", e))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, attributes) in self.endpoints.iter().enumerate() {
            EndpointInput::from(attributes.clone())
                .validate()
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Endpoint {} ({} {}): {}",
                        i,
                        attributes.verb,
                        attributes.path,
                        e
                    )
                })?;
        }
        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// SQLite database URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Log requests served by a registered endpoint
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests no endpoint matched
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_url: default_database_url(),
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_true() -> bool {
    true
}
