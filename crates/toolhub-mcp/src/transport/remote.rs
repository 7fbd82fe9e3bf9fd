//! Remote servers: streamable HTTP first, legacy SSE when the handshake POST
//! is rejected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use toolhub_core::{
    ClientInfo, InitializeResult, McpPrompt, McpPromptMessages, McpResource, McpResourceContents,
    McpTool, McpToolResult, McpTransport, TransportError,
};

use super::{RpcTransport, SseChannel, StreamableHttpChannel};

/// Transport that picks its wire protocol during `initialize`.
pub struct RemoteTransport {
    server_name: String,
    client: reqwest::Client,
    url: String,
    active: RwLock<Option<Arc<dyn McpTransport>>>,
}

impl RemoteTransport {
    pub fn new(
        server_name: &str,
        client: reqwest::Client,
        url: &str,
    ) -> Result<Self, TransportError> {
        reqwest::Url::parse(url)
            .map_err(|e| TransportError::Http(format!("Invalid MCP url '{url}': {e}")))?;
        Ok(Self {
            server_name: server_name.to_string(),
            client,
            url: url.to_string(),
            active: RwLock::new(None),
        })
    }

    async fn active(&self) -> Result<Arc<dyn McpTransport>, TransportError> {
        self.active.read().await.clone().ok_or_else(|| {
            TransportError::Protocol(format!(
                "Remote server '{}' is not initialized",
                self.server_name
            ))
        })
    }

    async fn handshake_streamable(
        &self,
        deadline: Duration,
        client: &ClientInfo,
    ) -> Result<(Arc<dyn McpTransport>, InitializeResult), TransportError> {
        let channel = StreamableHttpChannel::new(self.client.clone(), &self.url)?;
        let transport: Arc<dyn McpTransport> =
            Arc::new(RpcTransport::new(&self.server_name, channel));
        let init = transport.initialize(deadline, client).await?;
        Ok((transport, init))
    }

    async fn handshake_sse(
        &self,
        deadline: Duration,
        client: &ClientInfo,
    ) -> Result<(Arc<dyn McpTransport>, InitializeResult), TransportError> {
        let channel = SseChannel::connect(self.client.clone(), &self.url, deadline).await?;
        let transport: Arc<dyn McpTransport> =
            Arc::new(RpcTransport::new(&self.server_name, channel));
        match transport.initialize(deadline, client).await {
            Ok(init) => Ok((transport, init)),
            Err(e) => {
                let _ = transport.close().await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl McpTransport for RemoteTransport {
    async fn initialize(
        &self,
        deadline: Duration,
        client: &ClientInfo,
    ) -> Result<InitializeResult, TransportError> {
        let (transport, init) = match self.handshake_streamable(deadline, client).await {
            Ok(done) => done,
            Err(TransportError::Http(reason)) => {
                info!(
                    server_name = %self.server_name,
                    reason = %reason,
                    "Streamable HTTP handshake rejected, trying SSE"
                );
                self.handshake_sse(deadline, client).await.map_err(|e| {
                    debug!(server_name = %self.server_name, error = %e, "SSE fallback failed");
                    TransportError::Http(format!("{reason}; SSE fallback: {e}"))
                })?
            }
            Err(e) => return Err(e),
        };

        let previous = self.active.write().await.replace(transport);
        if let Some(previous) = previous {
            let _ = previous.close().await;
        }
        Ok(init)
    }

    async fn list_tools(&self, deadline: Duration) -> Result<Vec<McpTool>, TransportError> {
        self.active().await?.list_tools(deadline).await
    }

    async fn list_resources(
        &self,
        deadline: Duration,
    ) -> Result<Vec<McpResource>, TransportError> {
        self.active().await?.list_resources(deadline).await
    }

    async fn list_prompts(&self, deadline: Duration) -> Result<Vec<McpPrompt>, TransportError> {
        self.active().await?.list_prompts(deadline).await
    }

    async fn call_tool(
        &self,
        deadline: Duration,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, TransportError> {
        self.active()
            .await?
            .call_tool(deadline, name, arguments)
            .await
    }

    async fn read_resource(
        &self,
        deadline: Duration,
        uri: &str,
    ) -> Result<McpResourceContents, TransportError> {
        self.active().await?.read_resource(deadline, uri).await
    }

    async fn get_prompt(
        &self,
        deadline: Duration,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<McpPromptMessages, TransportError> {
        self.active()
            .await?
            .get_prompt(deadline, name, arguments)
            .await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let previous = self.active.write().await.take();
        match previous {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }
}
