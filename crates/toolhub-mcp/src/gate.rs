//! Caller-side permission gate in front of the MCP service.
//!
//! Front ends that expose tools to a model wrap the service in a
//! [`PermissionGate`]. A denied operation never reaches the service.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use toolhub_core::{
    CallRequest, CallResult, McpPromptMessages, McpResourceContents, McpServiceError,
    McpToolResult, PermissionChecker,
};

use crate::service::McpService;

/// Whether the user already confirmed an operation that needs approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Approval {
    Granted,
    #[default]
    NotGranted,
}

pub struct PermissionGate {
    checker: Arc<dyn PermissionChecker>,
    service: Arc<McpService>,
}

impl PermissionGate {
    pub fn new(checker: Arc<dyn PermissionChecker>, service: Arc<McpService>) -> Self {
        Self { checker, service }
    }

    pub const fn service(&self) -> &Arc<McpService> {
        &self.service
    }

    /// Check `request` for `session_id`, then forward it.
    pub async fn dispatch(
        &self,
        session_id: &str,
        request: CallRequest,
        approval: Approval,
    ) -> Result<CallResult, McpServiceError> {
        self.authorize(session_id, &request, approval)?;
        self.service.dispatch(request).await
    }

    pub async fn call_tool(
        &self,
        session_id: &str,
        server: &str,
        tool: &str,
        arguments: HashMap<String, Value>,
        approval: Approval,
    ) -> Result<McpToolResult, McpServiceError> {
        let request = CallRequest::tool(server, tool, arguments);
        self.authorize(session_id, &request, approval)?;
        self.service
            .call_tool(&request.server, &request.name, request.arguments)
            .await
    }

    pub async fn get_resource(
        &self,
        session_id: &str,
        server: &str,
        uri: &str,
        approval: Approval,
    ) -> Result<McpResourceContents, McpServiceError> {
        let request = CallRequest::resource(server, uri);
        self.authorize(session_id, &request, approval)?;
        self.service.get_resource(server, uri).await
    }

    pub async fn get_prompt(
        &self,
        session_id: &str,
        server: &str,
        prompt: &str,
        arguments: HashMap<String, Value>,
        approval: Approval,
    ) -> Result<McpPromptMessages, McpServiceError> {
        let request = CallRequest::prompt(server, prompt, arguments);
        self.authorize(session_id, &request, approval)?;
        self.service
            .get_prompt(&request.server, &request.name, request.arguments)
            .await
    }

    fn authorize(
        &self,
        session_id: &str,
        request: &CallRequest,
        approval: Approval,
    ) -> Result<(), McpServiceError> {
        let target = request.permission_target();
        let decision = self.checker.check_permission(
            session_id,
            request.kind,
            &request.server,
            target,
            &request.arguments,
        );

        if !decision.allowed {
            debug!(session_id, kind = %request.kind, target, reason = %decision.reason, "Permission denied");
            return Err(McpServiceError::PermissionDenied {
                kind: request.kind,
                target: target.to_string(),
                reason: decision.reason,
            });
        }
        if decision.requires_approval && approval != Approval::Granted {
            return Err(McpServiceError::ApprovalRequired {
                kind: request.kind,
                target: target.to_string(),
                reason: decision.reason,
            });
        }
        Ok(())
    }
}
