//! Server state definition.

use docsync::{DocumentRegistry, ServerContext, TopicHub};
use model_store::SqliteModelStore;
use server_config_and_utils::{Config, Paths};
use std::sync::Arc;

/// Registry over the durable store, publishing to the in-process hub.
pub type Registry = DocumentRegistry<SqliteModelStore, TopicHub>;

/// Shared server state (thread-safe).
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub paths: Arc<Paths>,
    pub registry: Arc<Registry>,
    /// Hub that change notifications are published on and subscribers read from.
    pub hub: Arc<TopicHub>,
}

impl ServerState {
    pub fn new(config: Config, paths: Paths, store: SqliteModelStore) -> Self {
        let hub = Arc::new(TopicHub::with_capacity(config.notify_channel_capacity));
        let ctx = ServerContext::from_shared(Arc::new(store), hub.clone());
        Self {
            config: Arc::new(config),
            paths: Arc::new(paths),
            registry: Arc::new(DocumentRegistry::new(ctx)),
            hub,
        }
    }
}
