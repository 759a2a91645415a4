//! # Observability
//!
//! Structured logging for the plot server.
//!
//! Services call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Every event becomes one JSON line in
//! the server log file (`~/.plotserver/logs/server.jsonl` by default):
//!
//! ```text
//! tail -f ~/.plotserver/logs/server.jsonl | jq
//! ```
//!
//! Fields that carry capability secrets (`apikey`, `token`, ...) are
//! redacted before they reach the file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "plotserver".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     })
//!     .expect("logging");
//!
//!     tracing::info!("service started");
//! }
//! ```

mod file;
mod json_layer;

use std::io;
use std::path::PathBuf;

pub use file::LogFileWriter;
pub use json_layer::{JsonLayer, LogEntry, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info,docsync=trace").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Log file path. Defaults to `~/.plotserver/logs/server.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "plotserver".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Default log file location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".plotserver").join("logs").join("server.jsonl"))
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) -> io::Result<PathBuf> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Returns the path of the log file in use. Fails if the file cannot be
/// opened or a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<PathBuf> {
    let log_path = match config.log_path.clone() {
        Some(path) => path,
        None => default_log_path().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not determine home directory")
        })?,
    };
    file::init_file_subscriber(&config, &log_path)?;
    Ok(log_path)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};
