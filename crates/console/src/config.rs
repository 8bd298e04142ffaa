//! Configuration management for the console front-end.
//!
//! Settings are loaded from a TOML file, then overridden by the environment
//! and command-line flags, then validated as a whole.

use anyhow::{Context, Result};
use console_client::{ApiFlavor, ConsoleOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Environment variable that supplies the API key without writing it to disk.
pub const API_KEY_ENV: &str = "CONSOLE_API_KEY";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_request_timeout() -> u64 {
    10
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where console grants come from
    pub panel: PanelSettings,
    /// Client tunables
    #[serde(default)]
    pub console: ConsoleOptions,
    /// Diagnostic logging
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Management API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSettings {
    /// Base URL of the dashboard backend or panel
    pub base_url: String,
    /// Bearer key sent with grant requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_flavor: ApiFlavor,
    /// `Origin` header for the websocket handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Server to attach to when `--server` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            api_flavor: ApiFlavor::default(),
            origin: None,
            request_timeout_secs: default_request_timeout(),
            server_id: None,
        }
    }
}

impl PanelSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration is written to `path`
    /// and returned.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Takes the API key from the environment when one is set.
    pub fn apply_env_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.panel.api_key = Some(key);
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        let base_url_ok = Url::parse(&self.panel.base_url)
            .map(|url| {
                matches!(url.scheme(), "http" | "https") && url.has_host() && !url.cannot_be_a_base()
            })
            .unwrap_or(false);
        if !base_url_ok {
            return Err(format!(
                "Invalid panel base URL: {}",
                &self.panel.base_url
            ));
        }

        if self.panel.request_timeout_secs == 0 {
            return Err("Panel request timeout must be at least one second".to_string());
        }

        self.console.validate()?;

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
