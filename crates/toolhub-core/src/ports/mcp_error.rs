//! MCP service error types.
//!
//! This module defines service-level errors for MCP operations.

use std::time::Duration;

use thiserror::Error;

use super::catalog::CatalogError;
use super::registry::RegistryError;
use super::transport::TransportError;
use crate::domain::mcp::OperationKind;

/// Domain-specific errors for MCP service operations.
///
/// Transport failures are wrapped with the server name and operation so
/// callers never see a bare socket or process error.
#[derive(Debug, Error)]
pub enum McpServiceError {
    #[error("MCP server not found: {0}")]
    NotFound(String),

    #[error("MCP server already exists: {0}")]
    AlreadyExists(String),

    /// Configuration validation error.
    #[error("Invalid MCP configuration: {0}")]
    InvalidConfig(String),

    /// Request arguments did not satisfy the target's declared requirements.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The server has no live connection.
    #[error("MCP server not connected: {0}")]
    NotConnected(String),

    #[error("MCP server is disabled: {0}")]
    Disabled(String),

    /// The controller was stopped; it starts nothing afterwards.
    #[error("MCP controller is shut down, not starting '{0}'")]
    ShutDown(String),

    #[error("MCP {operation} on '{server}' failed: {source}")]
    Transport {
        server: String,
        operation: String,
        #[source]
        source: TransportError,
    },

    #[error("MCP {operation} on '{server}' timed out after {timeout:?}")]
    Timeout {
        server: String,
        operation: String,
        timeout: Duration,
    },

    /// Registry persistence failed.
    #[error("Registry error: {0}")]
    Storage(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Permission denied for {kind} '{target}': {reason}")]
    PermissionDenied {
        kind: OperationKind,
        target: String,
        reason: String,
    },

    #[error("Approval required for {kind} '{target}': {reason}")]
    ApprovalRequired {
        kind: OperationKind,
        target: String,
        reason: String,
    },
}

impl McpServiceError {
    /// Wrap a transport error with context, promoting timeouts.
    pub fn transport(
        server: impl Into<String>,
        operation: impl Into<String>,
        err: TransportError,
    ) -> Self {
        match err {
            TransportError::Timeout(timeout) => Self::Timeout {
                server: server.into(),
                operation: operation.into(),
                timeout,
            },
            source => Self::Transport {
                server: server.into(),
                operation: operation.into(),
                source,
            },
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<RegistryError> for McpServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => Self::NotFound(name),
            RegistryError::AlreadyExists(name) => Self::AlreadyExists(name),
            RegistryError::Validation(msg) => Self::InvalidConfig(msg),
            RegistryError::Storage(msg) | RegistryError::Serialization(msg) => Self::Storage(msg),
        }
    }
}

/// User-safe error information for MCP events.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpErrorInfo {
    /// Name of the MCP server.
    pub server_name: String,

    /// User-friendly error message.
    pub message: String,

    /// Error category for UI handling.
    pub category: McpErrorCategory,
}

/// Categories of MCP errors for UI handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpErrorCategory {
    /// Connection lifecycle error.
    Connection,
    /// Protocol communication error.
    Protocol,
    /// Tool, resource or prompt invocation error.
    Invocation,
    /// Configuration error.
    Configuration,
    /// Permission or approval error.
    Permission,
    /// Unknown/internal error.
    Unknown,
}

impl McpErrorInfo {
    pub fn new(server_name: impl Into<String>, error: &McpServiceError) -> Self {
        Self {
            server_name: server_name.into(),
            message: error.to_string(),
            category: McpErrorCategory::from(error),
        }
    }

    /// Create error info for a connection error.
    pub fn connection(server_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            message: message.into(),
            category: McpErrorCategory::Connection,
        }
    }
}

impl From<&McpServiceError> for McpErrorCategory {
    fn from(error: &McpServiceError) -> Self {
        match error {
            McpServiceError::Storage(_) | McpServiceError::Catalog(_) => Self::Unknown,
            McpServiceError::NotConnected(_)
            | McpServiceError::Disabled(_)
            | McpServiceError::ShutDown(_)
            | McpServiceError::Timeout { .. } => Self::Connection,
            McpServiceError::Transport { source, .. } => match source {
                TransportError::SpawnFailed(_)
                | TransportError::Io(_)
                | TransportError::Http(_)
                | TransportError::Closed
                | TransportError::Timeout(_) => Self::Connection,
                TransportError::Json(_) | TransportError::Protocol(_) => Self::Protocol,
                TransportError::Server { .. } => Self::Invocation,
            },
            McpServiceError::Validation(_) => Self::Invocation,
            McpServiceError::NotFound(_)
            | McpServiceError::AlreadyExists(_)
            | McpServiceError::InvalidConfig(_) => Self::Configuration,
            McpServiceError::PermissionDenied { .. } | McpServiceError::ApprovalRequired { .. } => {
                Self::Permission
            }
        }
    }
}
