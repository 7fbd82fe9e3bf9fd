//! MCP (Model Context Protocol) tool-server domain types.
//!
//! These types represent tool servers in the system, independent of any
//! infrastructure concerns (file storage, process management, networking).
//!
//! # Design
//!
//! - `McpServerConfig` - Desired state of one server, persisted in the registry
//! - `McpTransportKind` - Connection type (local, remote, sse, http)
//! - `ConnectionState` - Runtime lifecycle state of a connection
//! - `ConnectionSnapshot` - Copied-out view of one runtime connection
//! - `McpServerStatus` - Read model merging desired and runtime state
//! - `McpTool` / `McpResource` / `McpPrompt` - Discovered capabilities
//! - `CallRequest` / `CallResult` - One proxied invocation

mod capabilities;
mod config;
mod runtime;

pub use capabilities::{
    McpPrompt, McpPromptArgument, McpPromptMessages, McpResource, McpResourceContents, McpTool,
    McpToolResult,
};
pub use config::{McpCapabilityFlags, McpEnvEntry, McpServerConfig, McpTransportKind};
pub use runtime::{
    CallRequest, CallResult, ConnectionSnapshot, ConnectionState, McpServerStatus, OperationKind,
};
