//! Configuration loading and persistence.
//!
//! Handles reading and writing the chatlink configuration file. The bearer
//! token is never written to disk; it only arrives through `CHATLINK_TOKEN`
//! or an explicit login.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::DEFAULT_COMPOSING_INDICATOR;

/// Configuration for the chatlink client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Request/response endpoint (HTTP(S) URL).
    pub http_url: String,
    /// Persistent channel endpoint (WS(S) URL, HTTP(S) is converted).
    pub channel_url: String,
    /// Bearer token - NOT serialized to disk.
    #[serde(skip)]
    pub token: String,
    /// How long the chat "composing" indicator stays set, in milliseconds.
    #[serde(default = "default_composing_ms")]
    pub composing_indicator_ms: u64,
}

fn default_composing_ms() -> u64 {
    u64::try_from(DEFAULT_COMPOSING_INDICATOR.as_millis()).unwrap_or(2000)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_url: "http://localhost:4000/graphql".to_string(),
            channel_url: "ws://localhost:4000/api".to_string(),
            token: String::new(),
            composing_indicator_ms: default_composing_ms(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `CHATLINK_CONFIG_DIR` env var: explicit override
    /// 2. `CHATLINK_ENV=test|system_test`: repo `tmp/chatlink-test`
    /// 3. Default: platform config dir + `chatlink`
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("CHATLINK_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if crate::env::is_any_test() {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/chatlink-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("chatlink")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[Config] Using defaults: {}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(http_url) = std::env::var("CHATLINK_HTTP_URL") {
            self.http_url = http_url;
        }

        if let Ok(channel_url) = std::env::var("CHATLINK_CHANNEL_URL") {
            self.channel_url = channel_url;
        }

        if let Ok(token) = std::env::var("CHATLINK_TOKEN") {
            self.token = token;
        }

        if let Ok(ms) = std::env::var("CHATLINK_COMPOSING_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.composing_indicator_ms = ms;
            }
        }
    }

    /// Persists the current configuration to disk.
    ///
    /// The token is never written.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Set a single configuration value by key.
    ///
    /// Only persisted keys are accepted; `token` is rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "http_url" => self.http_url = value.to_string(),
            "channel_url" => self.channel_url = value.to_string(),
            "composing_indicator_ms" => {
                self.composing_indicator_ms = value
                    .parse()
                    .with_context(|| format!("composing_indicator_ms must be an integer, got '{value}'"))?;
            }
            "token" => anyhow::bail!("token is not stored in the config file; use CHATLINK_TOKEN"),
            other => anyhow::bail!("Unknown config key '{other}'"),
        }
        Ok(())
    }

    /// Look up a single configuration value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "http_url" => Some(self.http_url.clone()),
            "channel_url" => Some(self.channel_url.clone()),
            "composing_indicator_ms" => Some(self.composing_indicator_ms.to_string()),
            _ => None,
        }
    }

    /// The configured token, or `None` when empty.
    pub fn token(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(&self.token)
        }
    }

    /// Composing indicator duration.
    pub fn composing_indicator(&self) -> Duration {
        Duration::from_millis(self.composing_indicator_ms)
    }
}
