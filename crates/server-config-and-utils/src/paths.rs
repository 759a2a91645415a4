//! File system paths for the server.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the server.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.plotserver)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.plotserver`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".plotserver"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.plotserver).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.plotserver/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the model store path (~/.plotserver/models.sqlite).
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join("models.sqlite")
    }

    /// Get the gateway socket path (~/.plotserver/server.sock).
    pub fn socket_file(&self) -> PathBuf {
        self.base_dir.join("server.sock")
    }

    /// Get the PID file path (~/.plotserver/server.pid).
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("server.pid")
    }

    /// Get the logs directory (~/.plotserver/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.plotserver/logs/server.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("server.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
