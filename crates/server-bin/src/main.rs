//! Plot server - document session synchronization over a local socket.

mod app;
mod ipc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use server_config_and_utils::{init_logging, Config, Paths};

/// Plot server command-line interface.
#[derive(Parser)]
#[command(name = "plotserver")]
#[command(about = "Document session server for collaborative plotting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, store, logs, config). Defaults to ~/.plotserver
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start {
        /// Also log to stderr
        #[arg(short, long)]
        foreground: bool,
    },
    /// Stop the server
    Stop,
    /// Check server status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    match cli.command {
        Some(Commands::Start { foreground }) => {
            init_logging(&paths, &config.log_level, foreground)?;
            app::run_server(config, paths).await?;
        }
        None => {
            // Default to start in foreground if no command given
            init_logging(&paths, &config.log_level, true)?;
            app::run_server(config, paths).await?;
        }
        Some(Commands::Stop) => {
            app::stop_server(&config, &paths).await?;
        }
        Some(Commands::Status) => {
            app::check_status(&config, &paths).await?;
        }
    }

    Ok(())
}
