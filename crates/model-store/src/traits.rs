//! Storage trait definitions.

use crate::StoreResult;

/// Trait for model store backends.
///
/// Implementations must be safe to share across every in-flight request.
pub trait ModelStore: Send + Sync {
    /// Read the record stored under `key`.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous record.
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete the record under `key`.
    ///
    /// Returns true if a record was removed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List all keys that start with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

impl<T: ModelStore + ?Sized> ModelStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key)
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        (**self).has(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }
}
