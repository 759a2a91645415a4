//! Logging initialization for the server.
//!
//! Thin wrapper over the observability crate. Every server component logs
//! through `tracing`; events land as JSONL in `<base>/logs/server.jsonl`.

use crate::{CoreError, CoreResult, Paths};

/// Initialize the logging system for the server.
///
/// `RUST_LOG` takes precedence over `level`. With `also_stderr` a compact
/// human-readable copy goes to stderr (foreground mode).
///
/// ```ignore
/// init_logging(&paths, "info", true)?;
/// tracing::info!("server started");
/// ```
pub fn init_logging(paths: &Paths, level: &str, also_stderr: bool) -> CoreResult<()> {
    observability::init_with_config(observability::LogConfig {
        service_name: "plotserver".into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    })
    .map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => {
            CoreError::Config(format!("logging already initialized: {e}"))
        }
        _ => CoreError::Io(e),
    })?;
    Ok(())
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
