//! Configuration types and loading
//!
//! Path precedence: `--config` > `CONFIG_PATH` > `oci-chat.toml`.

use oci_authenticator::AuthSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub auth: AuthSettings,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Where requests go and which OCI resources they are billed to
#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub service_endpoint: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub conversation_store_id: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: None,
            max_tokens: None,
        }
    }
}

fn default_timeout() -> u64 {
    120
}

fn default_model() -> String {
    "openai.gpt-4o".to_string()
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if config.endpoint.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !set(&config.endpoint.region)
            && !set(&config.endpoint.service_endpoint)
            && !set(&config.endpoint.base_url)
        {
            return Err(common::Error::MissingField(
                "endpoint.region, endpoint.service_endpoint or endpoint.base_url".into(),
            ));
        }

        if config.chat.model.trim().is_empty() {
            return Err(common::Error::Config("chat.model must not be empty".into()));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oci-chat.toml")
    }
}
