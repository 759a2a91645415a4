//! Configuration management for the server.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-topic buffer for change notifications.
pub const DEFAULT_NOTIFY_CHANNEL_CAPACITY: usize = 100;

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "PLOTSERVER_LOG_LEVEL";

/// Main server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Model store location. Defaults to `<base>/models.sqlite`.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Gateway socket location. Defaults to `<base>/server.sock`.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// Undelivered notifications buffered per topic before slow subscribers lag.
    #[serde(default = "default_notify_channel_capacity")]
    pub notify_channel_capacity: usize,
    /// Remove unlisted documents once at startup. Off unless configured.
    #[serde(default)]
    pub sweep_on_start: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_notify_channel_capacity() -> usize {
    DEFAULT_NOTIFY_CHANNEL_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            store_path: None,
            socket_path: None,
            notify_channel_capacity: DEFAULT_NOTIFY_CHANNEL_CAPACITY,
            sweep_on_start: false,
        }
    }
}

impl Config {
    /// Load configuration from `<base>/config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Resolved model store path.
    pub fn store_path(&self, paths: &Paths) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| paths.store_file())
    }

    /// Resolved gateway socket path.
    pub fn socket_path(&self, paths: &Paths) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| paths.socket_file())
    }

    fn validate(&self) -> CoreResult<()> {
        if self.notify_channel_capacity == 0 {
            return Err(CoreError::Config(
                "notify_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Only the log level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var(LOG_LEVEL_ENV) {
            if !log_level.trim().is_empty() {
                self.log_level = log_level.trim().to_string();
            }
        }
    }
}
