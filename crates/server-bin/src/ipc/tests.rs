//! End-to-end gateway tests over a real socket.

use crate::app::{build_gateway, ServerState};
use model_store::SqliteModelStore;
use serde_json::{json, Value};
use server_config_and_utils::{Config, Paths};
use server_ipc::{error_codes, IpcClient, IpcServer, Method, Response};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    server: Arc<IpcServer>,
    client: IpcClient,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let state = ServerState::new(
            Config::default(),
            paths.clone(),
            SqliteModelStore::in_memory().unwrap(),
        );

        let socket = paths.socket_file();
        let server = Arc::new(build_gateway(&state, socket.to_str().unwrap()).await);
        tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });
        for _ in 0..200 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            server,
            client: IpcClient::new(socket.to_str().unwrap()),
            _dir: dir,
        }
    }

    async fn call(&self, method: Method, params: Value) -> Response {
        self.client
            .call_method_with_params(method, params)
            .await
            .unwrap()
    }

    async fn ok(&self, method: Method, params: Value) -> Value {
        let response = self.call(method, params).await;
        assert!(response.is_success(), "{method:?} failed: {:?}", response.error);
        response.result.unwrap()
    }

    async fn code(&self, method: Method, params: Value) -> Option<i32> {
        self.call(method, params).await.error_code()
    }

    /// Create a user and return its key.
    async fn user(&self, username: &str) -> String {
        let created = self.ok(Method::UserCreate, json!({ "username": username })).await;
        created["userapikey"].as_str().unwrap().to_string()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

#[tokio::test]
async fn create_document_and_read_it_back() {
    let h = Harness::start().await;
    let key = h.user("alice").await;

    let created = h
        .ok(
            Method::DocCreate,
            json!({ "username": "alice", "userapikey": key, "title": "Plot A" }),
        )
        .await;
    let docid = created["docid"].as_str().unwrap();
    let write_key = created["apikey"].as_str().unwrap();
    let read_key = created["readonlyapikey"].as_str().unwrap();
    assert_eq!(created["docs"], json!([{ "docid": docid, "title": "Plot A" }]));

    let state = h
        .ok(Method::DocGetState, json!({ "docid": docid, "apikey": read_key }))
        .await;
    assert_eq!(state["docid"], docid);
    assert_eq!(state["all_models"].as_array().unwrap().len(), 1);
    assert_eq!(state["all_models"][0]["type"], "PlotContext");
    assert_eq!(state["apikey"], read_key);

    let state = h
        .ok(Method::DocGetState, json!({ "docid": docid, "apikey": write_key }))
        .await;
    assert_eq!(state["apikey"], write_key);

    let grant = h
        .ok(Method::DocApiKey, json!({ "docid": docid, "apikey": read_key }))
        .await;
    assert_eq!(grant, json!({ "readonlyapikey": read_key }));

    let info = h
        .ok(Method::UserInfo, json!({ "username": "alice", "userapikey": key }))
        .await;
    assert_eq!(info["username"], "alice");
    assert_eq!(info["docs"].as_array().unwrap().len(), 1);
    assert!(info.get("apikey").is_none());
}

#[tokio::test]
async fn doc_by_title_finds_before_creating() {
    let h = Harness::start().await;
    let key = h.user("alice").await;
    let params = json!({ "username": "alice", "userapikey": key, "title": "Scratch" });

    let first = h.ok(Method::DocByTitle, params.clone()).await;
    assert_eq!(first["created"], true);

    let second = h.ok(Method::DocByTitle, params).await;
    assert_eq!(second["created"], false);
    assert_eq!(second["docid"], first["docid"]);
}

#[tokio::test]
async fn failures_map_to_error_codes() {
    let h = Harness::start().await;
    let key = h.user("alice").await;

    assert_eq!(
        h.code(Method::UserCreate, json!({ "username": "alice" })).await,
        Some(error_codes::CONFLICT)
    );
    assert_eq!(
        h.code(Method::UserInfo, json!({ "username": "alice", "userapikey": "nope" }))
            .await,
        Some(error_codes::NOT_AUTHENTICATED)
    );
    assert_eq!(
        h.code(Method::UserInfo, json!({ "username": "nobody", "userapikey": "nope" }))
            .await,
        Some(error_codes::NOT_AUTHENTICATED)
    );
    assert_eq!(
        h.code(Method::DocGetState, json!({ "docid": "missing", "apikey": "k" }))
            .await,
        Some(error_codes::NOT_FOUND)
    );
    assert_eq!(
        h.code(Method::DocCreate, json!({ "username": "alice", "userapikey": key }))
            .await,
        Some(error_codes::INVALID_PARAMS)
    );
    assert_eq!(
        h.code(Method::DocGetState, json!({ "docid": "d1" })).await,
        Some(error_codes::INVALID_PARAMS)
    );

    // Alice cannot delete a document she does not list.
    let carol_doc = {
        let carol_key = h
            .ok(Method::UserCreate, json!({ "username": "carol" }))
            .await["userapikey"]
            .as_str()
            .unwrap()
            .to_string();
        h.ok(
            Method::DocCreate,
            json!({ "username": "carol", "userapikey": carol_key, "title": "Theirs" }),
        )
        .await["docid"]
            .as_str()
            .unwrap()
            .to_string()
    };
    assert_eq!(
        h.code(
            Method::DocDelete,
            json!({ "username": "alice", "userapikey": key, "docid": carol_doc }),
        )
        .await,
        Some(error_codes::NOT_FOUND)
    );
}

#[tokio::test]
async fn unusable_usernames_are_invalid_params() {
    let h = Harness::start().await;
    for username in ["", "team:alice"] {
        assert_eq!(
            h.code(Method::UserCreate, json!({ "username": username }))
                .await,
            Some(error_codes::INVALID_PARAMS),
            "{username:?}"
        );
    }
}

#[tokio::test]
async fn concurrent_creates_keep_both_documents() {
    let h = Harness::start().await;
    let key = h.user("alice").await;
    let params = json!({ "username": "alice", "userapikey": key, "title": "Same" });

    let (first, second) = tokio::join!(
        h.ok(Method::DocCreate, params.clone()),
        h.ok(Method::DocCreate, params),
    );
    assert_ne!(first["docid"], second["docid"]);

    let info = h
        .ok(Method::UserInfo, json!({ "username": "alice", "userapikey": key }))
        .await;
    let listed: Vec<&Value> = info["docs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| &d["docid"])
        .collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&&first["docid"]));
    assert!(listed.contains(&&second["docid"]));
}

#[tokio::test]
async fn read_key_cannot_update_and_guesses_get_nothing() {
    let h = Harness::start().await;
    let key = h.user("alice").await;
    let created = h
        .ok(
            Method::DocCreate,
            json!({ "username": "alice", "userapikey": key, "title": "Plot A" }),
        )
        .await;
    let docid = created["docid"].as_str().unwrap();
    let read_key = created["readonlyapikey"].as_str().unwrap();

    assert_eq!(
        h.code(
            Method::DocUpdate,
            json!({ "docid": docid, "apikey": read_key, "models": [] }),
        )
        .await,
        Some(error_codes::NOT_AUTHENTICATED)
    );
    assert_eq!(
        h.code(Method::DocApiKey, json!({ "docid": docid, "apikey": "guess" }))
            .await,
        Some(error_codes::NOT_AUTHENTICATED)
    );
}

#[tokio::test]
async fn update_adds_reachable_models_and_prunes_detached_ones() {
    let h = Harness::start().await;
    let key = h.user("alice").await;
    let created = h
        .ok(
            Method::DocCreate,
            json!({ "username": "alice", "userapikey": key, "title": "Plot A" }),
        )
        .await;
    let docid = created["docid"].as_str().unwrap();
    let write_key = created["apikey"].as_str().unwrap();

    let state = h
        .ok(Method::DocGetState, json!({ "docid": docid, "apikey": write_key }))
        .await;
    let root_id = state["plot_context_ref"]["id"].as_str().unwrap().to_string();

    let updated = h
        .ok(
            Method::DocUpdate,
            json!({
                "docid": docid,
                "apikey": write_key,
                "models": [
                    {
                        "id": root_id,
                        "type": "PlotContext",
                        "attrs": { "children": [{ "type": "Plot", "id": "p1" }] },
                    },
                    { "id": "p1", "type": "Plot", "attrs": { "title": "sine" } },
                    { "id": "loose", "type": "Glyph", "attrs": {} },
                ],
            }),
        )
        .await;
    assert_eq!(updated, json!({ "updated": 3, "removed": 0 }));

    let state = h
        .ok(Method::DocGetState, json!({ "docid": docid, "apikey": write_key }))
        .await;
    let mut ids: Vec<&str> = state["all_models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    ids.sort();
    let mut expected = vec![root_id.as_str(), "p1"];
    expected.sort();
    assert_eq!(ids, expected);

    assert_eq!(
        h.code(
            Method::DocUpdate,
            json!({ "docid": docid, "apikey": write_key, "remove": [root_id] }),
        )
        .await,
        Some(error_codes::CONFLICT)
    );
}

#[tokio::test]
async fn subscriber_sees_docchange_for_own_documents() {
    let h = Harness::start().await;
    let key = h.user("alice").await;

    assert!(h.client.subscribe("alice", "wrong").await.is_err());
    let mut subscription = h.client.subscribe("alice", &key).await.unwrap();

    h.ok(
        Method::DocCreate,
        json!({ "username": "alice", "userapikey": key, "title": "Plot A" }),
    )
    .await;

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.topic, "user:alice");
    assert_eq!(event.data, json!({ "msgtype": "docchange" }));

    subscription.unsubscribe().await.unwrap();
}

#[tokio::test]
async fn health_and_shutdown() {
    let h = Harness::start().await;

    let health = h.ok(Method::Health, Value::Null).await;
    assert_eq!(health["status"], "ok");

    let bye = h.ok(Method::Shutdown, Value::Null).await;
    assert_eq!(bye["status"], "shutting_down");
}
