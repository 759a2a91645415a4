//! Process-wide handles shared by every request.

use std::sync::Arc;

use model_store::ModelStore;

use crate::notifier::ChangeNotifier;

/// The model store and change notifier, passed explicitly to whoever needs them.
pub struct ServerContext<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S: ModelStore, N: ChangeNotifier> ServerContext<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(notifier))
    }

    /// Build a context around handles that are already shared elsewhere.
    pub fn from_shared(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }
}

// Manual impl: cloning the handles must not require `S: Clone` or `N: Clone`.
impl<S, N> Clone for ServerContext<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}
