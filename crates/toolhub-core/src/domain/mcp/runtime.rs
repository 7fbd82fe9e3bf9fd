//! Runtime (non-persisted) views of tool-server connections.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capabilities::{
    McpPrompt, McpPromptMessages, McpResource, McpResourceContents, McpTool, McpToolResult,
};
use super::config::{McpServerConfig, McpTransportKind};

/// Lifecycle state of a server connection.
///
/// `Stopped` and absence from the runtime table mean the same thing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Stopped,
    Connecting,
    Connected,
    /// Lost after a failed health check; a reconnect is pending or will be
    /// scheduled on the next tick.
    Disconnected,
}

impl ConnectionState {
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Copy of one runtime connection entry, safe to hold across lock boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub name: String,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub tools: Vec<McpTool>,
    pub resources: Vec<McpResource>,
    pub prompts: Vec<McpPrompt>,
}

/// Status read model merging persisted and runtime fields for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerStatus {
    pub name: String,
    pub description: String,
    pub transport: McpTransportKind,
    pub enabled: bool,
    pub connected: bool,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub tool_count: usize,
    pub resource_count: usize,
    pub prompt_count: usize,
}

impl McpServerStatus {
    /// Merge a config with its runtime entry, if any.
    ///
    /// A server without a live connection reports `connected = false` and zero
    /// counts regardless of what it advertised before.
    pub fn merge(config: &McpServerConfig, connection: Option<&ConnectionSnapshot>) -> Self {
        let live = connection.filter(|c| c.state.is_connected());
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            transport: config.transport,
            enabled: config.enabled,
            connected: live.is_some(),
            state: connection.map_or(ConnectionState::Stopped, |c| c.state),
            last_seen: connection.and_then(|c| c.last_seen),
            tool_count: live.map_or(0, |c| c.tools.len()),
            resource_count: live.map_or(0, |c| c.resources.len()),
            prompt_count: live.map_or(0, |c| c.prompts.len()),
        }
    }
}

/// Kind of proxied operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Tool,
    Resource,
    Prompt,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        })
    }
}

/// One proxied invocation against a server.
///
/// For resources `name` carries the resource URI and `arguments` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub server: String,
    pub kind: OperationKind,
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
    /// Overrides the default request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl CallRequest {
    pub fn tool(
        server: impl Into<String>,
        tool: impl Into<String>,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            server: server.into(),
            kind: OperationKind::Tool,
            name: tool.into(),
            arguments,
            timeout: None,
        }
    }

    pub fn resource(server: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            kind: OperationKind::Resource,
            name: uri.into(),
            arguments: HashMap::new(),
            timeout: None,
        }
    }

    pub fn prompt(
        server: impl Into<String>,
        prompt: impl Into<String>,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            server: server.into(),
            kind: OperationKind::Prompt,
            name: prompt.into(),
            arguments,
            timeout: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The target handed to permission checks: the resource URI for
    /// resources, the server name otherwise.
    pub fn permission_target(&self) -> &str {
        match self.kind {
            OperationKind::Resource => &self.name,
            OperationKind::Tool | OperationKind::Prompt => &self.server,
        }
    }
}

/// Outcome of a [`CallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "lowercase")]
pub enum CallResult {
    Tool(McpToolResult),
    Resource(McpResourceContents),
    Prompt(McpPromptMessages),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_snapshot() -> ConnectionSnapshot {
        ConnectionSnapshot {
            name: "fs".to_string(),
            state: ConnectionState::Connected,
            last_seen: Some(Utc::now()),
            tools: vec![McpTool::new("read"), McpTool::new("write")],
            resources: vec![McpResource::new("file:///a", "a")],
            prompts: Vec::new(),
        }
    }

    #[test]
    fn test_status_without_runtime_entry() {
        let config = McpServerConfig::local("fs", vec!["cat".to_string()]);
        let status = McpServerStatus::merge(&config, None);
        assert!(status.enabled);
        assert!(!status.connected);
        assert_eq!(status.state, ConnectionState::Stopped);
        assert_eq!(status.tool_count, 0);
    }

    #[test]
    fn test_status_with_connected_entry() {
        let config = McpServerConfig::local("fs", vec!["cat".to_string()]);
        let snapshot = connected_snapshot();
        let status = McpServerStatus::merge(&config, Some(&snapshot));
        assert!(status.connected);
        assert_eq!(status.tool_count, 2);
        assert_eq!(status.resource_count, 1);
        assert_eq!(status.prompt_count, 0);
    }

    #[test]
    fn test_status_disconnected_reports_zero_counts() {
        let config = McpServerConfig::local("fs", vec!["cat".to_string()]);
        let mut snapshot = connected_snapshot();
        snapshot.state = ConnectionState::Disconnected;
        let status = McpServerStatus::merge(&config, Some(&snapshot));
        assert!(!status.connected);
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.tool_count, 0);
        assert_eq!(status.resource_count, 0);
    }

    #[test]
    fn test_permission_target() {
        let tool = CallRequest::tool("fs", "read", HashMap::new());
        assert_eq!(tool.permission_target(), "fs");

        let resource = CallRequest::resource("fs", "file:///etc/hosts");
        assert_eq!(resource.permission_target(), "file:///etc/hosts");
    }
}
