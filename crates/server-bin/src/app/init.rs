//! Server initialization.

use crate::app::ServerState;
use crate::ipc::register_handlers;
use model_store::SqliteModelStore;
use server_config_and_utils::{Config, Paths};
use server_ipc::{IpcClient, IpcServer, Method};
use tracing::{info, warn};

/// Run the server until it is asked to shut down.
pub async fn run_server(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    // Singleton enforcement: refuse to start next to a live server
    let socket_path = config.socket_path(&paths);
    if socket_path.exists() {
        let client = IpcClient::new(&socket_path.to_string_lossy());
        if client.call_method(Method::Health).await.is_ok() {
            return Err(format!(
                "server is already running on {}; use 'plotserver stop' first",
                socket_path.display()
            )
            .into());
        }
        warn!(path = %socket_path.display(), "removing stale socket file");
        let _ = std::fs::remove_file(&socket_path);
    }

    paths.ensure_dirs()?;

    let pid = std::process::id();
    std::fs::write(paths.pid_file(), pid.to_string())?;
    info!(pid, "starting plot server");

    let store_path = config.store_path(&paths);
    let store = SqliteModelStore::open(&store_path)
        .map_err(|e| format!("failed to open model store at {}: {e}", store_path.display()))?;
    info!(path = %store_path.display(), "model store opened");

    let state = ServerState::new(config, paths.clone(), store);

    if state.config.sweep_on_start {
        match state.registry.sweep_orphaned_documents() {
            Ok(removed) => info!(count = removed.len(), "orphaned documents swept"),
            Err(e) => warn!(error = %e, "orphan sweep skipped"),
        }
    }

    let server = build_gateway(&state, &socket_path.to_string_lossy()).await;

    let shutdown_tx = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = shutdown_tx.send(());
        }
    });

    let result = server.run().await;

    let _ = std::fs::remove_file(paths.pid_file());
    info!("plot server stopped");
    result.map_err(Into::into)
}

/// Create the gateway with every handler registered.
pub async fn build_gateway(state: &ServerState, socket_path: &str) -> IpcServer {
    let server = IpcServer::new(socket_path, state.hub.clone());
    register_handlers(&server, state.clone()).await;
    server
}
