//! MCP tool-server lifecycle management.
//!
//! [`McpService`] is the entry point: it keeps the registry and the running
//! connections in step. [`McpController`] owns the connections, the health
//! loop and reconnects. [`PermissionGate`] is the optional caller-side policy
//! check in front of proxied operations.

#![deny(unsafe_code)]

pub mod controller;
pub mod env;
pub mod gate;
pub(crate) mod path;
pub mod service;
pub mod shell;
pub mod transport;

// Re-export domain types from core for convenience
pub use toolhub_core::{
    ConnectionSnapshot, ConnectionState, McpServerConfig, McpServerStatus, McpServiceError,
    McpTool, McpToolResult, McpTransportKind,
};

// Re-export this crate's public types
pub use controller::McpController;
pub use env::{EnvProvider, SystemEnv};
pub use gate::{Approval, PermissionGate};
pub use service::{McpService, StartReport};
pub use transport::DefaultTransportFactory;
