//! JSON-RPC 2.0 framing and MCP payload mapping shared by all transports.
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use toolhub_core::{
    AdvertisedCapabilities, ClientInfo, InitializeResult, McpPrompt, McpPromptMessages,
    McpResource, McpResourceContents, McpTool, McpToolResult, TransportError,
};

/// Protocol revision requested during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
pub fn notification(method: &str, params: Option<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params.unwrap_or_else(|| json!({}))
    })
}

/// Any inbound JSON-RPC message. Only responses (id plus result or error)
/// are routed; server requests and notifications are ignored.
#[derive(Debug, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcMessage {
    /// Id of a response message; `None` for requests and notifications.
    pub fn response_id(&self) -> Option<u64> {
        if self.result.is_none() && self.error.is_none() {
            return None;
        }
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// Convert a response into its result payload.
    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Server {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| TransportError::Protocol("Missing result in response".to_string()))
    }
}

/// Parse one line or SSE payload; `None` for anything that is not JSON-RPC.
pub fn parse_message(text: &str) -> Option<JsonRpcMessage> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Outstanding requests awaiting a response, keyed by id.
///
/// Used by transports whose responses arrive on a separate reader task.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Allocate an id and a receiver for its response.
    pub fn register(&self) -> Result<(u64, oneshot::Receiver<JsonRpcMessage>), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        Ok((id, rx))
    }

    /// Route a response to its waiter. Returns false for unknown ids.
    pub fn complete(&self, message: JsonRpcMessage) -> bool {
        let Some(id) = message.response_id() else {
            return false;
        };
        let Some(tx) = self.lock().remove(&id) else {
            return false;
        };
        tx.send(message).is_ok()
    }

    /// Forget a request whose caller gave up.
    pub fn cancel(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Mark closed and drop every waiter; their receivers observe `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcMessage>>> {
        // A poisoned map only means another caller panicked mid-insert.
        self.waiting
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP payloads
// ─────────────────────────────────────────────────────────────────────────────

pub fn initialize_params(client: &ClientInfo) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": client.name,
            "version": client.version
        },
        "capabilities": {}
    })
}

#[derive(Debug, Deserialize)]
struct RawInitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(default, rename = "serverInfo")]
    server_info: Option<RawServerInfo>,
    #[serde(default)]
    capabilities: RawCapabilities,
}

#[derive(Debug, Deserialize)]
struct RawServerInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCapabilities {
    #[serde(default)]
    tools: Option<Value>,
    #[serde(default)]
    resources: Option<Value>,
    #[serde(default)]
    prompts: Option<Value>,
}

pub fn parse_initialize(result: Value) -> Result<InitializeResult, TransportError> {
    let raw: RawInitializeResult = serde_json::from_value(result)?;
    let (server_name, server_version) = raw
        .server_info
        .map_or((None, None), |info| (Some(info.name), info.version));
    Ok(InitializeResult {
        protocol_version: raw.protocol_version,
        server_name,
        server_version,
        capabilities: AdvertisedCapabilities {
            tools: raw.capabilities.tools.is_some(),
            resources: raw.capabilities.resources.is_some(),
            prompts: raw.capabilities.prompts.is_some(),
        },
    })
}

/// MCP tool from tools/list.
#[derive(Debug, Deserialize)]
struct McpToolSchema {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

/// One page of a list response: the items under `key` and the next cursor.
pub fn parse_page<T: for<'de> Deserialize<'de>>(
    result: &Value,
    key: &str,
) -> Result<(Vec<T>, Option<String>), TransportError> {
    let items = result.get(key).cloned().unwrap_or_else(|| json!([]));
    let items = serde_json::from_value(items)?;
    let cursor = result
        .get("nextCursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok((items, cursor))
}

pub fn parse_tools_page(result: &Value) -> Result<(Vec<McpTool>, Option<String>), TransportError> {
    let (schemas, cursor) = parse_page::<McpToolSchema>(result, "tools")?;
    let tools = schemas
        .into_iter()
        .map(|t| McpTool {
            name: t.name,
            description: t.description,
            input_schema: t.input_schema,
        })
        .collect();
    Ok((tools, cursor))
}

pub fn parse_resources_page(
    result: &Value,
) -> Result<(Vec<McpResource>, Option<String>), TransportError> {
    parse_page(result, "resources")
}

pub fn parse_prompts_page(
    result: &Value,
) -> Result<(Vec<McpPrompt>, Option<String>), TransportError> {
    parse_page(result, "prompts")
}

/// Map a tools/call result. MCP returns a content array with text/image
/// items and flags failures with `isError`.
pub fn parse_tool_result(result: &Value) -> McpToolResult {
    let content = result.get("content").cloned().unwrap_or_else(|| json!([]));
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        let error_msg = content
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        McpToolResult::error(error_msg)
    } else {
        McpToolResult::success(content)
    }
}

pub fn parse_resource_contents(uri: &str, result: &Value) -> McpResourceContents {
    let contents = result
        .get("contents")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    McpResourceContents {
        uri: uri.to_string(),
        contents,
    }
}

pub fn parse_prompt_messages(result: Value) -> Result<McpPromptMessages, TransportError> {
    Ok(serde_json::from_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest::new(1, "tools/list", None);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params")); // Should be omitted when None
    }

    #[test]
    fn test_response_parsing() {
        let message = parse_message(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(message.response_id(), Some(1));
        assert!(message.into_result().is_ok());
    }

    #[test]
    fn test_error_response_maps_to_server_error() {
        let message = parse_message(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = message.into_result().unwrap_err();
        assert!(err.is_method_not_found());
    }

    #[test]
    fn test_notifications_and_noise_are_not_responses() {
        let note = parse_message(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).unwrap();
        assert_eq!(note.response_id(), None);
        assert!(parse_message("npm WARN deprecated").is_none());
        assert!(parse_message("   ").is_none());
    }

    #[test]
    fn test_parse_initialize_capabilities() {
        let init = parse_initialize(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "fs", "version": "1.2.0"},
            "capabilities": {"tools": {"listChanged": true}, "prompts": {}}
        }))
        .unwrap();
        assert_eq!(init.server_name.as_deref(), Some("fs"));
        assert!(init.capabilities.tools);
        assert!(!init.capabilities.resources);
        assert!(init.capabilities.prompts);
    }

    #[test]
    fn test_parse_tools_page_with_cursor() {
        let (tools, cursor) = parse_tools_page(&json!({
            "tools": [{"name": "read", "inputSchema": {"type": "object", "required": ["path"]}}],
            "nextCursor": "page-2"
        }))
        .unwrap();
        assert_eq!(tools[0].required_arguments(), vec!["path"]);
        assert_eq!(cursor.as_deref(), Some("page-2"));
    }

    #[test]
    fn test_parse_tool_result_error_flag() {
        let result = parse_tool_result(&json!({
            "content": [{"type": "text", "text": "file not found"}],
            "isError": true
        }));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("file not found"));
    }

    #[tokio::test]
    async fn test_pending_requests_routing() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register().unwrap();
        let message = parse_message(&format!(r#"{{"jsonrpc":"2.0","id":{id},"result":{{}}}}"#))
            .unwrap();
        assert!(pending.complete(message));
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_requests_close_wakes_waiters() {
        let pending = PendingRequests::new();
        let (_, rx) = pending.register().unwrap();
        pending.close();
        assert!(rx.await.is_err());
        assert!(matches!(pending.register(), Err(TransportError::Closed)));
    }
}
