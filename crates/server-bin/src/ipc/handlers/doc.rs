//! Document handlers.
//!
//! Owner-scoped methods (`doc.create`, `doc.delete`, `doc.by_title`)
//! authenticate with `username` + `userapikey`. Document-scoped methods
//! (`doc.get_state`, `doc.api_key`, `doc.update`) present `docid` + `apikey`.
//! Each runs on the blocking pool since every one of them touches the store.

use crate::app::ServerState;
use crate::ipc::params::{
    authenticated_user, doc_credentials, doc_error, required_str, respond_blocking, success,
};
use docsync::{Access, DocError, DocId, DocResult, ModelId, ModelObject};
use server_ipc::{error_codes, IpcServer, Method, Request, Response};
use tracing::debug;

/// Register document handlers.
pub async fn register(server: &IpcServer, state: ServerState) {
    let handlers: [(Method, fn(&ServerState, &Request) -> Response); 6] = [
        (Method::DocCreate, doc_create),
        (Method::DocDelete, doc_delete),
        (Method::DocByTitle, doc_by_title),
        (Method::DocGetState, doc_get_state),
        (Method::DocApiKey, doc_api_key),
        (Method::DocUpdate, doc_update),
    ];
    for (method, handler) in handlers {
        let state = state.clone();
        server
            .register_handler(method, move |req| respond_blocking(state.clone(), req, handler))
            .await;
    }
}

fn doc_create(state: &ServerState, req: &Request) -> Response {
    let mut user = match authenticated_user(state, req) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let title = match required_str(req, "title") {
        Ok(title) => title,
        Err(response) => return response,
    };

    match state.registry.create_document(&mut user, title) {
        Ok(document) => Response::success(
            &req.id,
            serde_json::json!({
                "docid": document.docid,
                "title": document.title,
                "apikey": document.write_key,
                "readonlyapikey": document.read_key,
                "docs": user.docs,
            }),
        ),
        Err(e) => doc_error(&req.id, &e),
    }
}

fn doc_delete(state: &ServerState, req: &Request) -> Response {
    let mut user = match authenticated_user(state, req) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let docid = match required_str(req, "docid") {
        Ok(docid) => DocId::from_string(docid),
        Err(response) => return response,
    };

    match state.registry.delete_document(&mut user, &docid) {
        Ok(()) => success(&req.id, &state.registry.user_info(&user)),
        Err(e) => doc_error(&req.id, &e),
    }
}

fn doc_by_title(state: &ServerState, req: &Request) -> Response {
    let mut user = match authenticated_user(state, req) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let title = match required_str(req, "title") {
        Ok(title) => title,
        Err(response) => return response,
    };

    match state.registry.find_or_create_by_title(&mut user, title) {
        Ok((found, created)) => Response::success(
            &req.id,
            serde_json::json!({
                "docid": found.docid,
                "title": found.title,
                "created": created,
            }),
        ),
        Err(e) => doc_error(&req.id, &e),
    }
}

fn doc_get_state(state: &ServerState, req: &Request) -> Response {
    let (docid, apikey) = match doc_credentials(req) {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    match state.registry.get_state(&docid, apikey) {
        Ok(doc_state) => success(&req.id, &doc_state),
        Err(e) => doc_error(&req.id, &e),
    }
}

fn doc_api_key(state: &ServerState, req: &Request) -> Response {
    let (docid, apikey) = match doc_credentials(req) {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    match state.registry.document_api_key(&docid, apikey) {
        Ok(grant) => success(&req.id, &grant),
        Err(e) => doc_error(&req.id, &e),
    }
}

/// Objects to upsert and ids to remove in one `doc.update` call.
#[derive(Debug, Default, serde::Deserialize)]
struct UpdateParams {
    #[serde(default)]
    models: Vec<ModelObject>,
    #[serde(default)]
    remove: Vec<ModelId>,
}

fn doc_update(state: &ServerState, req: &Request) -> Response {
    let (docid, apikey) = match doc_credentials(req) {
        Ok(creds) => creds,
        Err(response) => return response,
    };
    let params: UpdateParams = match req
        .params
        .clone()
        .map(serde_json::from_value::<UpdateParams>)
        .transpose()
    {
        Ok(params) => params.unwrap_or_default(),
        Err(e) => {
            return Response::error(
                &req.id,
                error_codes::INVALID_PARAMS,
                &format!("invalid models: {e}"),
            )
        }
    };

    match apply_update(state, &docid, apikey, params) {
        Ok((updated, removed)) => Response::success(
            &req.id,
            serde_json::json!({ "updated": updated, "removed": removed }),
        ),
        Err(e) => doc_error(&req.id, &e),
    }
}

/// Upsert then remove, each write going straight to the store.
fn apply_update(
    state: &ServerState,
    docid: &DocId,
    apikey: &str,
    params: UpdateParams,
) -> DocResult<(usize, usize)> {
    let mut session = state.registry.open_session(docid, apikey, Access::Write)?;

    let mut updated = 0;
    for object in params.models {
        if session.get(&object.id).is_some() {
            let id = object.id.clone();
            session.update(&id, |existing| {
                existing.type_name = object.type_name;
                existing.attrs = object.attrs;
            })?;
        } else {
            session.insert(object)?;
        }
        updated += 1;
    }

    let mut removed = 0;
    for id in &params.remove {
        match session.remove(id) {
            Ok(_) => removed += 1,
            Err(DocError::NotFound(_)) => debug!(docid = %docid, model = %id, "already gone"),
            Err(e) => return Err(e),
        }
    }

    debug!(docid = %docid, updated, removed, "document updated");
    Ok((updated, removed))
}
