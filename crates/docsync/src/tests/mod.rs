//! Engine tests for docsync.
//!
//! - `scenarios.rs` - End-to-end flows through the registry
//! - `registry.rs`  - Document and user lifecycle
//! - `session.rs`   - Load, prune, serialization and mutation
//! - `failures.rs`  - Store failure injection

mod scenarios;
mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use model_store::{MemoryModelStore, ModelStore, StoreError, StoreResult};

use crate::notifier::RecordingNotifier;
use crate::registry::DocumentRegistry;
use crate::ServerContext;

pub(crate) type TestRegistry = DocumentRegistry<MemoryModelStore, RecordingNotifier>;

pub(crate) fn registry() -> TestRegistry {
    DocumentRegistry::new(ServerContext::new(
        MemoryModelStore::new(),
        RecordingNotifier::new(),
    ))
}

/// Store wrapper that fails selected operations on demand.
#[derive(Default)]
pub(crate) struct FailingStore {
    pub inner: MemoryModelStore,
    fail_reads: AtomicBool,
    fail_set_prefix: Mutex<Option<String>>,
    fail_deletes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_sets_under(&self, prefix: Option<&str>) {
        *self.fail_set_prefix.lock().unwrap() = prefix.map(str::to_string);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    fn injected() -> StoreError {
        StoreError::Backend("injected failure".to_string())
    }
}

impl ModelStore for FailingStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        if let Some(prefix) = self.fail_set_prefix.lock().unwrap().as_deref() {
            if key.starts_with(prefix) {
                return Err(Self::injected());
            }
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.delete(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.keys_with_prefix(prefix)
    }
}
