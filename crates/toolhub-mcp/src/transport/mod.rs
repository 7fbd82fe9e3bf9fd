//! Concrete transports and the factory the controller connects through.
//!
//! Every transport is a [`RpcChannel`] (send a request, send a notification,
//! close) wrapped in [`RpcTransport`], which maps MCP operations onto
//! JSON-RPC methods once for all of them.

mod event_stream;
mod http;
mod protocol;
mod remote;
mod sse;
mod stdio;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use toolhub_core::{
    ClientInfo, ConnectTarget, InitializeResult, McpPrompt, McpPromptMessages, McpResource,
    McpResourceContents, McpTool, McpToolResult, McpTransport, McpTransportKind, TransportError,
    TransportFactory,
};

pub use http::StreamableHttpChannel;
pub use protocol::PROTOCOL_VERSION;
pub use remote::RemoteTransport;
pub use sse::SseChannel;
pub use stdio::StdioChannel;

/// Upper bound on pages fetched for one list call.
const MAX_LIST_PAGES: usize = 64;

/// Raw JSON-RPC exchange over some wire.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Send a request and return its `result` payload.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError>;

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Record the protocol revision agreed during the handshake.
    fn set_protocol_version(&self, _version: &str) {}

    async fn close(&self) -> Result<(), TransportError>;
}

/// MCP operations over any [`RpcChannel`].
pub struct RpcTransport<C> {
    server_name: String,
    channel: C,
}

impl<C: RpcChannel> RpcTransport<C> {
    pub fn new(server_name: impl Into<String>, channel: C) -> Self {
        Self {
            server_name: server_name.into(),
            channel,
        }
    }

    /// Follow `nextCursor` until exhausted. "Method not found" means the
    /// server simply has nothing of this kind.
    async fn list_all<T>(
        &self,
        method: &str,
        deadline: Duration,
        parse: fn(&Value) -> Result<(Vec<T>, Option<String>), TransportError>,
    ) -> Result<Vec<T>, TransportError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let result = match self.channel.request(method, params, deadline).await {
                Ok(result) => result,
                Err(e) if e.is_method_not_found() => {
                    debug!(server_name = %self.server_name, method, "Method not supported");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };

            let (page, next) = parse(&result)?;
            items.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }

        debug!(server_name = %self.server_name, method, "Stopped paging at limit");
        Ok(items)
    }
}

#[async_trait]
impl<C: RpcChannel> McpTransport for RpcTransport<C> {
    async fn initialize(
        &self,
        deadline: Duration,
        client: &ClientInfo,
    ) -> Result<InitializeResult, TransportError> {
        let result = self
            .channel
            .request(
                "initialize",
                Some(protocol::initialize_params(client)),
                deadline,
            )
            .await?;
        let init = protocol::parse_initialize(result)?;
        self.channel.set_protocol_version(&init.protocol_version);

        self.channel.notify("notifications/initialized", None).await?;

        debug!(
            server_name = %self.server_name,
            protocol_version = %init.protocol_version,
            remote_name = ?init.server_name,
            "MCP handshake complete"
        );
        Ok(init)
    }

    async fn list_tools(&self, deadline: Duration) -> Result<Vec<McpTool>, TransportError> {
        self.list_all("tools/list", deadline, protocol::parse_tools_page)
            .await
    }

    async fn list_resources(
        &self,
        deadline: Duration,
    ) -> Result<Vec<McpResource>, TransportError> {
        self.list_all("resources/list", deadline, protocol::parse_resources_page)
            .await
    }

    async fn list_prompts(&self, deadline: Duration) -> Result<Vec<McpPrompt>, TransportError> {
        self.list_all("prompts/list", deadline, protocol::parse_prompts_page)
            .await
    }

    async fn call_tool(
        &self,
        deadline: Duration,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, TransportError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });
        let result = self
            .channel
            .request("tools/call", Some(params), deadline)
            .await?;
        Ok(protocol::parse_tool_result(&result))
    }

    async fn read_resource(
        &self,
        deadline: Duration,
        uri: &str,
    ) -> Result<McpResourceContents, TransportError> {
        let result = self
            .channel
            .request("resources/read", Some(json!({ "uri": uri })), deadline)
            .await?;
        Ok(protocol::parse_resource_contents(uri, &result))
    }

    async fn get_prompt(
        &self,
        deadline: Duration,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<McpPromptMessages, TransportError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });
        let result = self
            .channel
            .request("prompts/get", Some(params), deadline)
            .await?;
        protocol::parse_prompt_messages(result)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.channel.close().await
    }
}

/// Production factory: child processes for local servers, `reqwest` for
/// everything network-facing.
#[derive(Clone)]
pub struct DefaultTransportFactory {
    http: reqwest::Client,
}

impl DefaultTransportFactory {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, ...).
    pub const fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn connect(
        &self,
        server_name: &str,
        target: &ConnectTarget,
        deadline: Duration,
    ) -> Result<Arc<dyn McpTransport>, TransportError> {
        match target {
            ConnectTarget::Process(launch) => {
                let channel = StdioChannel::spawn(server_name, launch)?;
                Ok(Arc::new(RpcTransport::new(server_name, channel)))
            }
            ConnectTarget::Endpoint { kind, url } => match kind {
                McpTransportKind::Http => {
                    let channel = StreamableHttpChannel::new(self.http.clone(), url)?;
                    Ok(Arc::new(RpcTransport::new(server_name, channel)))
                }
                McpTransportKind::Sse => {
                    let channel = SseChannel::connect(self.http.clone(), url, deadline).await?;
                    Ok(Arc::new(RpcTransport::new(server_name, channel)))
                }
                McpTransportKind::Remote => Ok(Arc::new(RemoteTransport::new(
                    server_name,
                    self.http.clone(),
                    url,
                )?)),
                McpTransportKind::Local => Err(TransportError::Protocol(format!(
                    "Local server '{server_name}' needs a launch command, not a url"
                ))),
            },
        }
    }
}
