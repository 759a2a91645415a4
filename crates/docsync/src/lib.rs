//! # Docsync
//!
//! Document session synchronization for the plot server: persistence,
//! capability checks, reachability pruning, serialization and change
//! broadcast for documents made of model objects.
//!
//! ## Principles
//!
//! - **The model store is the only durable state** - Sessions are derived and request-scoped
//! - **Primary records first** - Documents and objects are written before the owning user record
//! - **Notifications reflect committed reality** - Published after the store write succeeds
//! - **Notification is best-effort** - A failed publish never fails the operation
//!
//! ## Architecture
//!
//! ```text
//! WRITE:
//!   access gate → model store → change notifier
//!
//! READ:
//!   access gate → load → prune → broadcast_attrs
//! ```
//!
//! ## Example
//!
//! ```rust
//! use docsync::{DocumentRegistry, RecordingNotifier, ServerContext};
//! use model_store::MemoryModelStore;
//!
//! let ctx = ServerContext::new(MemoryModelStore::new(), RecordingNotifier::new());
//! let registry = DocumentRegistry::new(ctx);
//!
//! let mut alice = registry.create_user("alice").unwrap();
//! let doc = registry.create_document(&mut alice, "Plot A").unwrap();
//!
//! let state = registry.get_state(&doc.docid, &doc.read_key).unwrap();
//! assert_eq!(state.all_models.len(), 1);
//! assert_eq!(registry.context().notifier().len(), 1);
//! ```
//!
//! ## Crate Structure
//!
//! - [`access`] - Capability checks
//! - [`session`] - Per-request working set of a document
//! - [`registry`] - Document and user lifecycle
//! - [`notifier`] - Change notification contracts
//! - [`types`] - Core types

pub mod access;
mod context;
pub mod notifier;
pub mod registry;
pub mod session;
pub mod types;

#[cfg(test)]
mod tests;

pub use access::Access;
pub use context::ServerContext;
pub use notifier::{
    user_topic, ChangeEvent, ChangeNotifier, NotifyError, NullNotifier, RecordingNotifier,
    TopicHub,
};
pub use registry::DocumentRegistry;
pub use session::{DocumentSession, PruneReport, SessionState};
pub use types::{
    ApiKeyGrant, BroadcastModel, DocId, DocRef, Document, DocumentState, ModelId, ModelObject,
    ModelRef, PublicUser, User, Value,
};

use model_store::StoreError;

/// Coarse classification of a [`DocError`], used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    Conflict,
    Unauthorized,
    NotFound,
    Internal,
}

/// Errors that can occur in docsync.
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    /// Malformed input, such as an unusable user name.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Identifier collision or a failed multi-record write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The presented key does not grant the requested access.
    #[error("unauthorized")]
    Unauthorized,

    /// User, document or object does not exist (or is not owned).
    #[error("not found: {0}")]
    NotFound(String),

    /// Model store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Operation is not valid in the session's current state.
    #[error("invalid session state: {0:?}")]
    InvalidState(SessionState),

    /// A record could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl DocError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocError::Invalid(_) => ErrorKind::Invalid,
            DocError::Conflict(_) => ErrorKind::Conflict,
            DocError::Unauthorized => ErrorKind::Unauthorized,
            DocError::NotFound(_) => ErrorKind::NotFound,
            DocError::Store(_) | DocError::InvalidState(_) | DocError::Encoding(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Result type for docsync operations.
pub type DocResult<T> = Result<T, DocError>;
