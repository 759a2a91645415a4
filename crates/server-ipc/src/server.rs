//! Gateway server implementation.
//!
//! Supports both request/response and streaming subscriptions.
//!
//! ## Streaming Subscriptions
//!
//! When a client sends `user.subscribe`, the connection stays open and
//! receives change events as NDJSON lines. The client should:
//!
//! 1. Send `user.subscribe` with `username` and `userapikey` params
//! 2. Receive success response
//! 3. Block reading events (NDJSON lines)
//! 4. Send `user.unsubscribe` or close connection to stop

use crate::{error_codes, Event, IpcError, IpcResult, Method, Request, Response};
use docsync::TopicHub;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Handler function type for gateway methods.
pub type HandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// Callback deciding which topic a `user.subscribe` request may listen to.
///
/// Returns the topic on success, or the error response to send back.
pub type SubscribeAuthFn = Box<
    dyn Fn(Request) -> Pin<Box<dyn Future<Output = Result<String, Response>> + Send>>
        + Send
        + Sync,
>;

/// Hands out topic receivers for streaming subscriptions.
#[derive(Clone)]
pub struct SubscriptionManager {
    hub: Arc<TopicHub>,
}

impl SubscriptionManager {
    pub fn new(hub: Arc<TopicHub>) -> Self {
        Self { hub }
    }

    /// The hub that change notifications are published on.
    pub fn hub(&self) -> &Arc<TopicHub> {
        &self.hub
    }

    /// Subscribe to a topic. Returns a receiver for raw payloads.
    pub fn subscribe(&self, topic: &str) -> IpcResult<broadcast::Receiver<Vec<u8>>> {
        self.hub
            .subscribe(topic)
            .map_err(|e| IpcError::Protocol(e.to_string()))
    }

    /// Drop channels for topics nobody listens to.
    pub fn cleanup(&self) {
        self.hub.cleanup();
    }
}

/// Gateway server.
pub struct IpcServer {
    socket_path: String,
    handlers: Arc<RwLock<HashMap<Method, HandlerFn>>>,
    shutdown_tx: broadcast::Sender<()>,
    subscriptions: SubscriptionManager,
    subscribe_auth: Arc<RwLock<Option<SubscribeAuthFn>>>,
}

impl IpcServer {
    /// Create a new gateway server publishing subscriptions from `hub`.
    pub fn new(socket_path: &str, hub: Arc<TopicHub>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path: socket_path.to_string(),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            subscriptions: SubscriptionManager::new(hub),
            subscribe_auth: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Register a handler for a method.
    pub async fn register_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: HandlerFn = Box::new(move |req| Box::pin(handler(req)));
        self.handlers.write().await.insert(method, handler);
    }

    /// Set the callback that authorizes `user.subscribe` requests.
    ///
    /// Without one, subscriptions are refused with `METHOD_NOT_FOUND`.
    pub async fn set_subscribe_auth<F, Fut>(&self, auth: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, Response>> + Send + 'static,
    {
        let auth: SubscribeAuthFn = Box::new(move |req| Box::pin(auth(req)));
        *self.subscribe_auth.write().await = Some(auth);
    }

    /// Get a shutdown receiver.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Get the shutdown sender, for handlers that stop the server.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Start the server.
    pub async fn run(&self) -> IpcResult<()> {
        // Remove stale socket file
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path, "gateway listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let conn = Connection {
                                handlers: self.handlers.clone(),
                                subscriptions: self.subscriptions.clone(),
                                subscribe_auth: self.subscribe_auth.clone(),
                                shutdown_tx: self.shutdown_tx.clone(),
                            };
                            tokio::spawn(async move {
                                if let Err(e) = conn.serve(stream).await {
                                    error!(error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("gateway shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

/// Shared state handed to each accepted connection.
struct Connection {
    handlers: Arc<RwLock<HashMap<Method, HandlerFn>>>,
    subscriptions: SubscriptionManager,
    subscribe_auth: Arc<RwLock<Option<SubscribeAuthFn>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Connection {
    async fn serve(&self, stream: UnixStream) -> IpcResult<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                debug!("client disconnected");
                break;
            }

            let request = match Request::from_json(line.trim()) {
                Ok(req) => req,
                Err(e) => {
                    warn!(error = %e, "unparseable request");
                    let response =
                        Response::error("", error_codes::PARSE_ERROR, &format!("Parse error: {e}"));
                    write_line(&mut writer, &response.to_json()?).await?;
                    continue;
                }
            };

            debug!(method = ?request.method, id = %request.id, "received request");

            match request.method {
                Method::UserSubscribe => {
                    let Some(topic) = self.authorize_subscription(&request, &mut writer).await?
                    else {
                        continue;
                    };
                    let event_rx = match self.subscriptions.subscribe(&topic) {
                        Ok(rx) => rx,
                        Err(e) => {
                            let response = Response::error(
                                &request.id,
                                error_codes::INTERNAL_ERROR,
                                &e.to_string(),
                            );
                            write_line(&mut writer, &response.to_json()?).await?;
                            continue;
                        }
                    };

                    let response = Response::success(
                        &request.id,
                        serde_json::json!({ "subscribed": true, "topic": topic }),
                    );
                    write_line(&mut writer, &response.to_json()?).await?;
                    info!(topic = %topic, "subscription started");

                    let outcome = self
                        .stream_events(&topic, event_rx, &mut reader, &mut writer)
                        .await;
                    self.subscriptions.cleanup();
                    info!(topic = %topic, "subscription ended");

                    if !outcome? {
                        break;
                    }
                }
                Method::UserUnsubscribe => {
                    // Nothing is streaming on this connection.
                    let response = Response::success(
                        &request.id,
                        serde_json::json!({ "unsubscribed": false }),
                    );
                    write_line(&mut writer, &response.to_json()?).await?;
                }
                method => {
                    let response = {
                        let handlers = self.handlers.read().await;
                        match handlers.get(&method) {
                            Some(handler) => handler(request).await,
                            None => Response::error(
                                &request.id,
                                error_codes::METHOD_NOT_FOUND,
                                &format!("Method not found: {method:?}"),
                            ),
                        }
                    };
                    write_line(&mut writer, &response.to_json()?).await?;
                }
            }
        }

        Ok(())
    }

    /// Run the subscribe callback. Writes the refusal and returns `None` when denied.
    async fn authorize_subscription(
        &self,
        request: &Request,
        writer: &mut OwnedWriteHalf,
    ) -> IpcResult<Option<String>> {
        let decision = {
            let auth = self.subscribe_auth.read().await;
            match auth.as_ref() {
                Some(auth) => auth(request.clone()).await,
                None => Err(Response::error(
                    &request.id,
                    error_codes::METHOD_NOT_FOUND,
                    "Subscriptions are not enabled",
                )),
            }
        };

        match decision {
            Ok(topic) => Ok(Some(topic)),
            Err(response) => {
                write_line(writer, &response.to_json()?).await?;
                Ok(None)
            }
        }
    }

    /// Forward topic payloads until the client unsubscribes, disconnects, or
    /// the server stops. Returns whether the connection is still usable.
    async fn stream_events(
        &self,
        topic: &str,
        mut event_rx: broadcast::Receiver<Vec<u8>>,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
    ) -> IpcResult<bool> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sequence = 0u64;
        let mut line = String::new();

        loop {
            tokio::select! {
                received = event_rx.recv() => {
                    match received {
                        Ok(payload) => {
                            sequence += 1;
                            let event = Event::from_payload(topic, &payload, sequence);
                            write_line(writer, &event.to_json()?).await?;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "subscriber lagged, events dropped");
                        }
                        Err(RecvError::Closed) => return Ok(true),
                    }
                }
                read = reader.read_line(&mut line) => {
                    if read? == 0 {
                        return Ok(false);
                    }
                    let response = match Request::from_json(line.trim()) {
                        Ok(req) if req.method == Method::UserUnsubscribe => {
                            let response = Response::success(
                                &req.id,
                                serde_json::json!({ "unsubscribed": true }),
                            );
                            write_line(writer, &response.to_json()?).await?;
                            return Ok(true);
                        }
                        Ok(req) => Response::error(
                            &req.id,
                            error_codes::INVALID_REQUEST,
                            "Only user.unsubscribe is accepted while subscribed",
                        ),
                        Err(e) => Response::error(
                            "",
                            error_codes::PARSE_ERROR,
                            &format!("Parse error: {e}"),
                        ),
                    };
                    write_line(writer, &response.to_json()?).await?;
                    line.clear();
                }
                _ = shutdown_rx.recv() => return Ok(false),
            }
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, json: &str) -> IpcResult<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Gateway client for talking to the server.
pub struct IpcClient {
    socket_path: String,
}

impl IpcClient {
    pub fn new(socket_path: &str) -> Self {
        Self {
            socket_path: socket_path.to_string(),
        }
    }

    async fn connect(&self) -> IpcResult<UnixStream> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to connect: {e}")))
    }

    /// Send a request and wait for its response.
    pub async fn call(&self, request: Request) -> IpcResult<Response> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_line(&mut writer, &request.to_json()?).await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        Ok(Response::from_json(line.trim())?)
    }

    /// Call a method without parameters.
    pub async fn call_method(&self, method: Method) -> IpcResult<Response> {
        self.call(Request::new(method)).await
    }

    /// Call a method with parameters.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> IpcResult<Response> {
        self.call(Request::with_params(method, params)).await
    }

    /// Check whether a server answers on the socket.
    pub async fn is_server_running(&self) -> bool {
        matches!(self.call_method(Method::Health).await, Ok(r) if r.is_success())
    }

    /// Subscribe to a user's change events.
    pub async fn subscribe(
        &self,
        username: &str,
        userapikey: &str,
    ) -> IpcResult<StreamingSubscription> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = Request::with_params(
            Method::UserSubscribe,
            serde_json::json!({ "username": username, "userapikey": userapikey }),
        );
        write_line(&mut writer, &request.to_json()?).await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        let response = Response::from_json(line.trim())?;
        if let Some(error) = response.error {
            return Err(IpcError::Protocol(format!(
                "subscribe refused ({}): {}",
                error.code, error.message
            )));
        }

        Ok(StreamingSubscription {
            reader,
            writer,
            line_buffer: String::new(),
        })
    }
}

/// An open `user.subscribe` connection.
pub struct StreamingSubscription {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line_buffer: String,
}

impl StreamingSubscription {
    /// Wait for the next event. Returns `None` once the server closes the stream.
    pub async fn recv(&mut self) -> IpcResult<Option<Event>> {
        loop {
            self.line_buffer.clear();
            if self.reader.read_line(&mut self.line_buffer).await? == 0 {
                return Ok(None);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match Event::from_json(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => debug!(error = %e, "skipping non-event line"),
            }
        }
    }

    /// Stop the subscription, discarding events still in flight.
    pub async fn unsubscribe(mut self) -> IpcResult<()> {
        let request = Request::new(Method::UserUnsubscribe);
        write_line(&mut self.writer, &request.to_json()?).await?;

        loop {
            self.line_buffer.clear();
            if self.reader.read_line(&mut self.line_buffer).await? == 0 {
                return Ok(());
            }
            if let Ok(response) = Response::from_json(self.line_buffer.trim()) {
                if response.id == request.id {
                    return Ok(());
                }
            }
        }
    }
}
