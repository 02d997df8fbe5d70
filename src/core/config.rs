use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::auth;
use crate::core::models::preferences::{DisplayPreferences, PercentMode, ResetWindow};
use crate::core::selector::SelectionPolicy;

pub const DEFAULT_USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
pub const DEFAULT_MODEL: &str = "gpt-5.3-codex";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub percent_mode: PercentMode,
    #[serde(default)]
    pub reset_window: ResetWindow,
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_label() -> String {
    "Codex".to_string()
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            percent_mode: PercentMode::default(),
            reset_window: ResetWindow::default(),
            label: default_label(),
        }
    }
}

impl DisplaySettings {
    pub fn preferences(&self) -> DisplayPreferences {
        DisplayPreferences {
            percent_mode: self.percent_mode,
            reset_window: self.reset_window,
        }
    }

    pub fn set_preferences(&mut self, prefs: DisplayPreferences) {
        self.percent_mode = prefs.percent_mode;
        self.reset_window = prefs.reset_window;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(default = "default_usage_url")]
    pub usage_url: String,
    /// Dedicated endpoint for the Spark model; empty means use `usage_url`.
    #[serde(default)]
    pub spark_usage_url: Option<String>,
    /// Retry a failed Spark request against `usage_url`.
    #[serde(default)]
    pub spark_endpoint_fallback: bool,
    /// 0 leaves the transport default in place.
    #[serde(default)]
    pub request_timeout_secs: u64,
}

fn default_usage_url() -> String {
    DEFAULT_USAGE_URL.to_string()
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            usage_url: default_usage_url(),
            spark_usage_url: None,
            spark_endpoint_fallback: false,
            request_timeout_secs: 0,
        }
    }
}

impl EndpointSettings {
    pub fn spark_usage_url(&self) -> Option<&str> {
        self.spark_usage_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Model assumed until the host reports one.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub auth_path: Option<PathBuf>,
}

fn default_interval_secs() -> u64 {
    60
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            model: default_model(),
            auth_path: None,
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn auth_path(&self) -> PathBuf {
        self.auth_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(auth::default_auth_path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub endpoint: EndpointSettings,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub refresh: RefreshSettings,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("codex-status").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !self.endpoint.usage_url.starts_with("https://") {
            issues.push(format!(
                "Invalid usage_url: '{}' (must use HTTPS)",
                self.endpoint.usage_url
            ));
        }
        if let Some(url) = self.endpoint.spark_usage_url() {
            if !url.starts_with("https://") {
                issues.push(format!("Invalid spark_usage_url: '{}' (must use HTTPS)", url));
            }
        }
        if self.refresh.interval_secs == 0 {
            issues.push("Invalid interval_secs: must be at least 1".to_string());
        }
        if self.refresh.model.trim().is_empty() {
            issues.push("Invalid model: must not be empty".to_string());
        }
        if self.display.label.trim().is_empty() {
            issues.push("Invalid label: must not be empty".to_string());
        }
        issues
    }
}
