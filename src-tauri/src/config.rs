//! Configuration management for the ShareLaTeX shell
//!
//! Persists harvest tunables as JSON in the platform config directory.
//! Supports Windows, macOS, and Linux.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::harvest::HarvestSettings;

/// Shortest poll interval accepted from the config file
pub const MIN_POLL_INTERVAL_MS: u64 = 50;

/// Errors that can occur while persisting configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config directory on this platform
    #[error("Could not determine config path")]
    NoConfigDir,

    /// IO error
    #[error("Failed to write config: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Milliseconds between poll ticks
    pub poll_interval_ms: u64,
    /// Name of the session cookie to capture
    pub session_cookie: String,
    /// Page expression holding the CSRF token
    pub token_expression: String,
    /// Sign-in window width
    pub window_width: u32,
    /// Sign-in window height
    pub window_height: u32,
    /// Abandon a harvest after this many seconds (unset: never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Tell the requester when a harvest ends without credentials
    pub notify_on_abort: bool,
    /// How long to wait for a page to answer a script evaluation
    pub eval_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            session_cookie: "sharelatex.sid".to_string(),
            token_expression: "window.csrfToken".to_string(),
            window_width: 960,
            window_height: 540,
            timeout_secs: None,
            notify_on_abort: false,
            eval_timeout_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Gets the config directory path (cross-platform)
    fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("ShareLatexShell"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/ShareLatexShell"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("sharelatex-shell"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }

    /// Gets the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Loads configuration from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Loads configuration from `path`; missing or malformed files yield defaults
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Saves configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Saves configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Poll interval with the lower bound applied
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_millis(self.eval_timeout_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Builds harvester settings from this configuration
    pub fn harvest_settings(&self) -> HarvestSettings {
        HarvestSettings {
            poll_interval: self.poll_interval(),
            session_cookie: self.session_cookie.clone(),
            token_expression: self.token_expression.clone(),
            window_width: f64::from(self.window_width),
            window_height: f64::from(self.window_height),
            timeout: self.timeout_secs.map(Duration::from_secs),
            notify_on_abort: self.notify_on_abort,
            ..HarvestSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval_ms, 300);
        assert_eq!(config.session_cookie, "sharelatex.sid");
        assert_eq!(config.token_expression, "window.csrfToken");
        assert!(config.timeout_secs.is_none());
        assert!(!config.notify_on_abort);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "poll_interval_ms": 500, "timeout_secs": 120 }"#).unwrap();

        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.timeout_secs, Some(120));
        assert_eq!(config.session_cookie, "sharelatex.sid");
        assert_eq!(config.window_width, 960);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig {
            notify_on_abort: true,
            timeout_secs: Some(90),
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn test_load_missing_or_malformed_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert_eq!(AppConfig::load_from(&missing), AppConfig::default());

        let malformed = dir.path().join("config.json");
        fs::write(&malformed, "{ not json").unwrap();
        assert_eq!(AppConfig::load_from(&malformed), AppConfig::default());
    }

    #[test]
    fn test_harvest_settings_conversion() {
        let config = AppConfig {
            poll_interval_ms: 10,
            timeout_secs: Some(30),
            window_width: 800,
            ..AppConfig::default()
        };
        let settings = config.harvest_settings();

        assert_eq!(settings.poll_interval, Duration::from_millis(MIN_POLL_INTERVAL_MS));
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.window_width, 800.0);
        assert_eq!(settings.session_cookie, "sharelatex.sid");
    }
}
