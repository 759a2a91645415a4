//! Handler registration for the gateway.

use crate::app::ServerState;
use crate::ipc::handlers;
use crate::ipc::params;
use docsync::user_topic;
use server_ipc::IpcServer;
use tracing::{debug, info};

/// Register all gateway handlers.
pub async fn register_handlers(server: &IpcServer, state: ServerState) {
    handlers::health::register(server).await;
    handlers::user::register(server, state.clone()).await;
    handlers::doc::register(server, state.clone()).await;

    register_subscribe_auth(server, state).await;

    info!("all gateway handlers registered");
}

/// Only the owner, presenting their user key, may follow `user:{username}`.
async fn register_subscribe_auth(server: &IpcServer, state: ServerState) {
    server
        .set_subscribe_auth(move |req| {
            let state = state.clone();
            async move {
                let id = req.id.clone();
                let checked =
                    params::run_blocking(&id, move || params::authenticated_user(&state, &req));
                let user = match checked.await {
                    Ok(Ok(user)) => user,
                    Ok(Err(response)) | Err(response) => return Err(response),
                };
                debug!(username = %user.username, "subscription authorized");
                Ok(user_topic(&user.username))
            }
        })
        .await;
}
