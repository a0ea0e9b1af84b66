//! Client configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::poller::POLL_INTERVAL;
use crate::push::{MAX_RETRY_COUNT, TOKEN_EXPIRATION_INTERVAL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Push notification relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub server_url: String,
    /// Hex X25519 key the anonymizing path encrypts to
    pub server_public_key: String,
    pub max_retry_count: u32,
    pub token_expiration_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            server_public_key: String::new(),
            max_retry_count: MAX_RETRY_COUNT,
            token_expiration_secs: TOKEN_EXPIRATION_INTERVAL.as_secs(), // 12 hours
        }
    }
}

impl PushConfig {
    pub fn token_expiration(&self) -> Duration {
        Duration::from_secs(self.token_expiration_secs)
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll_interval_ms: u64,
    pub push: PushConfig,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            push: PushConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `VEIL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overlay values returned by `lookup` for the `VEIL_*` variable names.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(interval) = lookup("VEIL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = interval
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid poll_interval_ms: {}", e)))?;
        }

        if let Some(url) = lookup("VEIL_PUSH_SERVER_URL") {
            self.push.server_url = url;
        }

        if let Some(key) = lookup("VEIL_PUSH_SERVER_PUBLIC_KEY") {
            self.push.server_public_key = key;
        }

        if let Some(count) = lookup("VEIL_PUSH_MAX_RETRY_COUNT") {
            self.push.max_retry_count = count
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid max_retry_count: {}", e)))?;
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.log_level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }

        if self.push.max_retry_count == 0 {
            return Err(ConfigError::Invalid("max_retry_count must be > 0".into()));
        }

        if !self.push.server_url.starts_with("http://") && !self.push.server_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "server_url must be an http(s) URL: {}",
                self.push.server_url
            )));
        }

        if !self.push.server_public_key.is_empty() {
            let key = hex::decode(&self.push.server_public_key)
                .map_err(|e| ConfigError::Invalid(format!("Invalid server_public_key: {}", e)))?;
            if key.len() != 32 {
                return Err(ConfigError::Invalid(format!(
                    "server_public_key must be 32 bytes, got {}",
                    key.len()
                )));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
