//! Lifecycle events emitted by the MCP service.

use serde::{Deserialize, Serialize};

use crate::domain::mcp::McpTransportKind;
use crate::ports::McpErrorInfo;

/// Canonical MCP lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpEvent {
    ServerAdded {
        server_name: String,
        transport: McpTransportKind,
    },
    ServerRemoved {
        server_name: String,
    },
    ServerStarted {
        server_name: String,
        tool_count: usize,
    },
    ServerStopped {
        server_name: String,
    },
    /// A health probe failed and the connection was dropped.
    ServerDisconnected {
        server_name: String,
    },
    /// A scheduled reconnect brought the server back.
    ServerReconnected {
        server_name: String,
        tool_count: usize,
    },
    ServerError {
        error: McpErrorInfo,
    },
}

impl McpEvent {
    pub fn server_added(server_name: impl Into<String>, transport: McpTransportKind) -> Self {
        Self::ServerAdded {
            server_name: server_name.into(),
            transport,
        }
    }

    pub fn server_removed(server_name: impl Into<String>) -> Self {
        Self::ServerRemoved {
            server_name: server_name.into(),
        }
    }

    pub fn server_started(server_name: impl Into<String>, tool_count: usize) -> Self {
        Self::ServerStarted {
            server_name: server_name.into(),
            tool_count,
        }
    }

    pub fn server_stopped(server_name: impl Into<String>) -> Self {
        Self::ServerStopped {
            server_name: server_name.into(),
        }
    }

    pub fn server_disconnected(server_name: impl Into<String>) -> Self {
        Self::ServerDisconnected {
            server_name: server_name.into(),
        }
    }

    pub fn server_reconnected(server_name: impl Into<String>, tool_count: usize) -> Self {
        Self::ServerReconnected {
            server_name: server_name.into(),
            tool_count,
        }
    }

    pub const fn server_error(error: McpErrorInfo) -> Self {
        Self::ServerError { error }
    }

    /// Name of the server this event concerns.
    pub fn server_name(&self) -> &str {
        match self {
            Self::ServerAdded { server_name, .. }
            | Self::ServerRemoved { server_name }
            | Self::ServerStarted { server_name, .. }
            | Self::ServerStopped { server_name }
            | Self::ServerDisconnected { server_name }
            | Self::ServerReconnected { server_name, .. } => server_name,
            Self::ServerError { error } => &error.server_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = McpEvent::server_started("fs", 3);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "server_started");
        assert_eq!(json["tool_count"], 3);
        assert_eq!(event.server_name(), "fs");
    }
}
