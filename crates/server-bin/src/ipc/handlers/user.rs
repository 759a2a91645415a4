//! User handlers.

use crate::app::ServerState;
use crate::ipc::params::{authenticated_user, doc_error, required_str, respond_blocking, success};
use server_ipc::{IpcServer, Method, Request, Response};

/// Register user handlers.
pub async fn register(server: &IpcServer, state: ServerState) {
    let create_state = state.clone();
    server
        .register_handler(Method::UserCreate, move |req| {
            respond_blocking(create_state.clone(), req, user_create)
        })
        .await;
    server
        .register_handler(Method::UserInfo, move |req| {
            respond_blocking(state.clone(), req, user_info)
        })
        .await;
}

fn user_create(state: &ServerState, req: &Request) -> Response {
    let username = match required_str(req, "username") {
        Ok(name) => name,
        Err(response) => return response,
    };
    match state.registry.create_user(username) {
        // The only time the user key is handed out.
        Ok(user) => Response::success(
            &req.id,
            serde_json::json!({
                "username": user.username,
                "userapikey": user.apikey,
                "docs": user.docs,
            }),
        ),
        Err(e) => doc_error(&req.id, &e),
    }
}

fn user_info(state: &ServerState, req: &Request) -> Response {
    match authenticated_user(state, req) {
        Ok(user) => success(&req.id, &state.registry.user_info(&user)),
        Err(response) => response,
    }
}
