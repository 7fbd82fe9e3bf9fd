//! Transport port: one live protocol connection to a tool server.
//!
//! Implementations own the wire format (JSON-RPC framing over stdio, HTTP or
//! SSE). Callers pass an explicit deadline to every operation; the controller
//! additionally enforces it so a misbehaving transport cannot hang a caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::mcp::{
    McpPrompt, McpPromptMessages, McpResource, McpResourceContents, McpTool, McpToolResult,
    McpTransportKind,
};

/// JSON-RPC code servers use for unsupported methods.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Errors that can occur while talking to a tool server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn MCP server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to communicate with MCP server: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("MCP server returned error: code={code}, message={message}")]
    Server { code: i64, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether the server reported the method as unsupported.
    pub const fn is_method_not_found(&self) -> bool {
        matches!(self, Self::Server { code, .. } if *code == METHOD_NOT_FOUND)
    }
}

/// Identity sent to servers during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolhub".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Capability families a server advertised during the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedCapabilities {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
}

impl AdvertisedCapabilities {
    pub const fn all() -> Self {
        Self {
            tools: true,
            resources: true,
            prompts: true,
        }
    }
}

/// Outcome of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub capabilities: AdvertisedCapabilities,
}

/// Fully resolved launch command for a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
}

/// Where a transport should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Spawn a local process.
    Process(LaunchSpec),
    /// Open a network transport of the given kind.
    Endpoint { kind: McpTransportKind, url: String },
}

/// A live protocol connection.
///
/// Methods take `&self` so one handle can serve concurrent calls.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Perform the protocol handshake.
    async fn initialize(
        &self,
        deadline: Duration,
        client: &ClientInfo,
    ) -> Result<InitializeResult, TransportError>;

    async fn list_tools(&self, deadline: Duration) -> Result<Vec<McpTool>, TransportError>;

    async fn list_resources(&self, deadline: Duration)
    -> Result<Vec<McpResource>, TransportError>;

    async fn list_prompts(&self, deadline: Duration) -> Result<Vec<McpPrompt>, TransportError>;

    async fn call_tool(
        &self,
        deadline: Duration,
        name: &str,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<McpToolResult, TransportError>;

    async fn read_resource(
        &self,
        deadline: Duration,
        uri: &str,
    ) -> Result<McpResourceContents, TransportError>;

    async fn get_prompt(
        &self,
        deadline: Duration,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<McpPromptMessages, TransportError>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens transports. The controller only ever talks to this factory, which
/// keeps process spawning and networking out of the lifecycle logic.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open (but do not initialize) a transport for `server_name`.
    async fn connect(
        &self,
        server_name: &str,
        target: &ConnectTarget,
        deadline: Duration,
    ) -> Result<Arc<dyn McpTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_not_found_detection() {
        let err = TransportError::Server {
            code: METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
        };
        assert!(err.is_method_not_found());
        assert!(!TransportError::Closed.is_method_not_found());
    }

    #[test]
    fn test_timeout_detection() {
        assert!(TransportError::Timeout(Duration::from_secs(5)).is_timeout());
        assert!(!TransportError::Protocol("bad".to_string()).is_timeout());
    }
}
