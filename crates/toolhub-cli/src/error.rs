//! CLI error type and exit-code mapping.

use thiserror::Error;
use toolhub_core::{McpErrorCategory, McpServiceError, PathError, RegistryError};

#[derive(Debug, Error)]
pub enum CliError {
    /// Bad command-line input.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Workspace or registry could not be used.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The operation was refused by the local policy.
    #[error("{0}")]
    Refused(String),

    /// A tool server could not be reached.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Service(String),
}

impl CliError {
    /// Exit code following sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 2,
            Self::Config(_) => 78,      // EX_CONFIG
            Self::Refused(_) => 77,     // EX_NOPERM
            Self::Unavailable(_) => 69, // EX_UNAVAILABLE
            Self::Service(_) => 1,
        }
    }
}

impl From<McpServiceError> for CliError {
    fn from(err: McpServiceError) -> Self {
        let message = err.to_string();
        match McpErrorCategory::from(&err) {
            McpErrorCategory::Configuration => match err {
                McpServiceError::NotFound(_) => Self::Service(message),
                _ => Self::Arguments(message),
            },
            McpErrorCategory::Invocation if matches!(err, McpServiceError::Validation(_)) => {
                Self::Arguments(message)
            }
            McpErrorCategory::Permission => Self::Refused(message),
            McpErrorCategory::Connection => Self::Unavailable(message),
            _ if matches!(err, McpServiceError::Storage(_)) => Self::Config(message),
            _ => Self::Service(message),
        }
    }
}

impl From<RegistryError> for CliError {
    fn from(err: RegistryError) -> Self {
        McpServiceError::from(err).into()
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolhub_core::{OperationKind, TransportError};

    #[test]
    fn test_validation_maps_to_usage_error() {
        let err: CliError = McpServiceError::Validation("missing path".to_string()).into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_denied_maps_to_no_permission() {
        let err: CliError = McpServiceError::PermissionDenied {
            kind: OperationKind::Tool,
            target: "fs".to_string(),
            reason: "outside workspace".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), 77);
        assert!(err.to_string().contains("outside workspace"));
    }

    #[test]
    fn test_unreachable_server_maps_to_unavailable() {
        let err: CliError = McpServiceError::transport(
            "fs",
            "initialize",
            TransportError::SpawnFailed("not found".to_string()),
        )
        .into();
        assert_eq!(err.exit_code(), 69);

        let err: CliError = McpServiceError::Timeout {
            server: "fs".to_string(),
            operation: "tools/call".to_string(),
            timeout: Duration::from_secs(60),
        }
        .into();
        assert_eq!(err.exit_code(), 69);
    }
}
