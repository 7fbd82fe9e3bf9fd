//! Domain types.

pub mod mcp;

pub use mcp::{
    CallRequest, CallResult, ConnectionSnapshot, ConnectionState, McpCapabilityFlags,
    McpEnvEntry, McpPrompt, McpPromptArgument, McpPromptMessages, McpResource,
    McpResourceContents, McpServerConfig, McpServerStatus, McpTool, McpToolResult,
    McpTransportKind, OperationKind,
};
