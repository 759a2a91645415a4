//! Gateway transport for the plot server.
//!
//! This crate provides:
//! - Unix domain socket server
//! - JSON-RPC-like protocol (one JSON object per line)
//! - Streaming change subscriptions backed by a [`docsync::TopicHub`]

mod error;
mod protocol;
mod server;

pub use error::{IpcError, IpcResult};
pub use protocol::{error_codes, ErrorInfo, Event, Method, Request, Response};
pub use server::{IpcClient, IpcServer, StreamingSubscription, SubscriptionManager};
