//! Key-value persistence for the plot server.
//!
//! This crate stores documents, users and model objects as opaque byte
//! records. It has no business logic:
//!
//! - **SQLite** via [`SqliteModelStore`] for durable storage
//! - **Memory** via [`MemoryModelStore`] for tests and ephemeral servers
//!
//! Writes are atomic per key. There are no multi-key transactions; callers
//! that touch more than one record write the primary record first and the
//! dependent record last.

pub mod keys;
mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryModelStore;
pub use sqlite::SqliteModelStore;
pub use traits::ModelStore;

use thiserror::Error;

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (poisoned lock, injected fault, ...)
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
