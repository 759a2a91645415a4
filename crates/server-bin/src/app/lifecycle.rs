//! Server lifecycle commands (stop, status).

use server_config_and_utils::{Config, Paths};
use server_ipc::{IpcClient, Method};

/// Stop the server.
pub async fn stop_server(
    config: &Config,
    paths: &Paths,
) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = config.socket_path(paths);
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Server is not running (socket not found)");
        if pid_path.exists() {
            let _ = std::fs::remove_file(&pid_path);
        }
        return Ok(());
    }

    let client = IpcClient::new(&socket_path.to_string_lossy());
    match client.call_method(Method::Shutdown).await {
        Ok(response) if response.is_success() => println!("Server shutdown initiated"),
        Ok(response) => println!("Shutdown failed: {:?}", response.error),
        Err(e) => println!("Failed to connect to server: {}", e),
    }

    // Wait for the server to remove its socket (up to 3 seconds)
    for _ in 0..30 {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        if !socket_path.exists() {
            println!("Server stopped");
            return Ok(());
        }
    }

    if !client.is_server_running().await {
        let _ = std::fs::remove_file(&socket_path);
        let _ = std::fs::remove_file(&pid_path);
        println!("Cleaned up stale socket file");
        return Ok(());
    }

    Err("server did not stop within 3 seconds".into())
}

/// Check server status.
pub async fn check_status(
    config: &Config,
    paths: &Paths,
) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = config.socket_path(paths);

    if !socket_path.exists() {
        println!("Server is not running (socket not found)");
        return Ok(());
    }

    let client = IpcClient::new(&socket_path.to_string_lossy());
    match client.call_method(Method::Health).await {
        Ok(response) if response.is_success() => {
            let result = response.result.unwrap_or_default();
            let field = |name: &str| {
                result
                    .get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string()
            };

            println!("Server is running");
            println!("  Status:  {}", field("status"));
            println!("  Version: {}", field("version"));
            if let Ok(pid) = std::fs::read_to_string(paths.pid_file()) {
                println!("  PID:     {}", pid.trim());
            }
            println!("  Socket:  {}", socket_path.display());
            println!("  Store:   {}", config.store_path(paths).display());
        }
        Ok(response) => println!("Server returned error: {:?}", response.error),
        Err(e) => {
            println!("Failed to connect to server: {}", e);
            println!("Server may not be running or socket may be stale");
        }
    }

    Ok(())
}
