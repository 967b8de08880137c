//! TOML configuration for the bridge.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::WalletError;
use crate::external::BroadcastMode;
use crate::transaction::{SigningPolicy, DEFAULT_MAX_RETRIES};
use crate::types::{AppIdentity, ProviderKind};

pub const RPC_URL_ENV: &str = "WALLET_BRIDGE_RPC_URL";

const DEFAULT_CONFIRM_DELAY_MS: u64 = 2_000;
const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

impl From<ConfigError> for WalletError {
    fn from(e: ConfigError) -> Self {
        WalletError::Config(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub selected_provider: ProviderKind,
    pub rpc_url: String,
    #[serde(default = "default_cluster")]
    pub cluster: String,
    #[serde(default)]
    pub signing_policy: SigningPolicy,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    pub app_identity: AppIdentity,
    #[serde(default)]
    pub send: SendConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    pub confirm_after_send: bool,
    pub max_retries: u32,
    pub confirm_delay_ms: u64,
    pub external_broadcast: BroadcastMode,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            confirm_after_send: true,
            max_retries: DEFAULT_MAX_RETRIES,
            confirm_delay_ms: DEFAULT_CONFIRM_DELAY_MS,
            external_broadcast: BroadcastMode::default(),
        }
    }
}

fn default_cluster() -> String {
    "mainnet-beta".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

impl BridgeConfig {
    /// Parse and validate without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.rpc_url.trim().is_empty() {
            errors.push("rpc_url must not be empty".to_string());
        }
        if self.app_identity.name.trim().is_empty() {
            errors.push("app_identity.name must not be empty".to_string());
        }
        if self.send.max_retries == 0 {
            errors.push("send.max_retries must be at least 1".to_string());
        }
        if self.rpc_timeout_ms == 0 {
            errors.push("rpc_timeout_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(RPC_URL_ENV).filter(|u| !u.trim().is_empty()) {
            tracing::debug!(rpc_url = %url, "rpc_url overridden from environment");
            self.rpc_url = url;
        }
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.send.confirm_delay_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Load a config file, apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: BridgeConfig = toml::from_str(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    tracing::info!(path = %path.display(), provider = %config.selected_provider, "configuration loaded");
    Ok(config)
}
