//! Permission port consulted by callers before proxied operations.

use std::collections::HashMap;

use crate::domain::mcp::OperationKind;

/// Verdict of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: String,
    /// The operation is allowed but the user must confirm it first.
    pub requires_approval: bool,
}

impl PermissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
            requires_approval: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_approval: false,
        }
    }

    pub fn needs_approval(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_approval: true,
        }
    }
}

/// Caller-side policy for proxied tool, resource and prompt operations.
///
/// `target` is the resource URI for resource reads and the server name for
/// everything else. `server` always names the server the operation goes to.
/// The MCP service never calls this itself.
pub trait PermissionChecker: Send + Sync {
    fn check_permission(
        &self,
        session_id: &str,
        kind: OperationKind,
        server: &str,
        target: &str,
        arguments: &HashMap<String, serde_json::Value>,
    ) -> PermissionDecision;
}
