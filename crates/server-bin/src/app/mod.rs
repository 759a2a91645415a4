//! Server application: startup, shared state and lifecycle commands.

mod init;
mod lifecycle;
mod state;

pub use init::{build_gateway, run_server};
pub use lifecycle::{check_status, stop_server};
pub use state::{Registry, ServerState};
