//! Request parameter extraction and error mapping shared by handlers.

use crate::app::ServerState;
use docsync::{DocError, DocId, ErrorKind, User};
use server_ipc::{error_codes, Request, Response};
use tokio::task;
use tracing::error;

/// A required string parameter, or an `INVALID_PARAMS` response.
pub fn required_str<'a>(req: &'a Request, name: &str) -> Result<&'a str, Response> {
    req.str_param(name).ok_or_else(|| {
        Response::error(
            &req.id,
            error_codes::INVALID_PARAMS,
            &format!("{name} is required"),
        )
    })
}

/// The `docid` and `apikey` pair every document method carries.
pub fn doc_credentials(req: &Request) -> Result<(DocId, &str), Response> {
    let docid = required_str(req, "docid")?;
    let apikey = required_str(req, "apikey")?;
    Ok((DocId::from_string(docid), apikey))
}

/// Authenticate the `username` and `userapikey` params.
pub fn authenticated_user(state: &ServerState, req: &Request) -> Result<User, Response> {
    let username = required_str(req, "username")?;
    let userapikey = required_str(req, "userapikey")?;
    state
        .registry
        .authenticate_user(username, userapikey)
        .map_err(|e| doc_error(&req.id, &e))
}

/// Map a registry failure to its wire error code.
pub fn doc_error(id: &str, err: &DocError) -> Response {
    let code = match err.kind() {
        ErrorKind::Invalid => error_codes::INVALID_PARAMS,
        ErrorKind::Unauthorized => error_codes::NOT_AUTHENTICATED,
        ErrorKind::NotFound => error_codes::NOT_FOUND,
        ErrorKind::Conflict => error_codes::CONFLICT,
        ErrorKind::Internal => {
            error!(error = %err, "request failed");
            error_codes::INTERNAL_ERROR
        }
    };
    Response::error(id, code, &err.to_string())
}

/// Serialize a handler result, mapping encoding failures to `INTERNAL_ERROR`.
pub fn success<T: serde::Serialize>(id: &str, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(json) => Response::success(id, json),
        Err(e) => Response::error(id, error_codes::INTERNAL_ERROR, &e.to_string()),
    }
}

/// Run store work on the blocking pool.
///
/// A task that panics or is cancelled becomes an `INTERNAL_ERROR` response for `id`.
pub async fn run_blocking<T, F>(id: &str, work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    task::spawn_blocking(work).await.map_err(|e| {
        error!(request_id = %id, error = %e, "handler task failed");
        Response::error(
            id,
            error_codes::INTERNAL_ERROR,
            &format!("handler task failed: {e}"),
        )
    })
}

/// Answer `req` by running a synchronous handler on the blocking pool.
pub async fn respond_blocking(
    state: ServerState,
    req: Request,
    handler: fn(&ServerState, &Request) -> Response,
) -> Response {
    let id = req.id.clone();
    run_blocking(&id, move || handler(&state, &req))
        .await
        .unwrap_or_else(|response| response)
}
