//! Streamable HTTP transport: every JSON-RPC message is a POST; the reply is
//! either a JSON body or a short `text/event-stream`.

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use toolhub_core::TransportError;

use super::RpcChannel;
use super::event_stream::{SseDecoder, is_event_stream_content_type};
use super::protocol::{JsonRpcMessage, JsonRpcRequest, notification, parse_message};

const MCP_JSON_CONTENT_TYPE: &str = "application/json";
const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_HEADER: &str = "mcp-session-id";

pub struct StreamableHttpChannel {
    client: reqwest::Client,
    url: reqwest::Url,
    next_id: AtomicU64,
    session_id: Mutex<Option<String>>,
    protocol_version: Mutex<Option<String>>,
}

impl StreamableHttpChannel {
    pub fn new(client: reqwest::Client, url: &str) -> Result<Self, TransportError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| TransportError::Http(format!("Invalid MCP url '{url}': {e}")))?;
        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
            session_id: Mutex::new(None),
            protocol_version: Mutex::new(None),
        })
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn post(&self, body: String) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(self.url.clone())
            .header("Content-Type", MCP_JSON_CONTENT_TYPE)
            .header("Accept", MCP_JSON_AND_SSE_ACCEPT)
            .body(body);

        let protocol_version = self
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(version) = protocol_version.filter(|v| !v.trim().is_empty()) {
            request = request.header(MCP_PROTOCOL_VERSION_HEADER, version);
        }
        if let Some(session_id) = self.session_id() {
            request = request.header(MCP_SESSION_HEADER, session_id);
        }
        request
    }

    /// POST one message and check the status; remembers a session id.
    async fn send(&self, body: String) -> Result<reqwest::Response, TransportError> {
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self
                .session_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(session_id.to_string());
        }
        Ok(response)
    }

    async fn exchange(&self, id: u64, body: String) -> Result<JsonRpcMessage, TransportError> {
        let response = self.send(body).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_event_stream_content_type(&content_type) {
            return next_response(response, id).await;
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Read an event stream until the response for `id` arrives.
async fn next_response(
    response: reqwest::Response,
    id: u64,
) -> Result<JsonRpcMessage, TransportError> {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransportError::Http(e.to_string()))?;
        for event in decoder.push(&chunk) {
            if let Some(message) = matching(&event.data, id) {
                return Ok(message);
            }
        }
    }

    if let Some(message) = decoder.finish().and_then(|event| matching(&event.data, id)) {
        return Ok(message);
    }

    Err(TransportError::Protocol(
        "Empty event-stream response".to_string(),
    ))
}

fn matching(data: &str, id: u64) -> Option<JsonRpcMessage> {
    parse_message(data).filter(|message| message.response_id() == Some(id))
}

#[async_trait]
impl RpcChannel for StreamableHttpChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        debug!(url = %self.url, method, id, "Sending MCP HTTP request");

        tokio::time::timeout(deadline, self.exchange(id, body))
            .await
            .map_err(|_| TransportError::Timeout(deadline))??
            .into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let body = serde_json::to_string(&notification(method, params))?;
        self.send(body).await.map(drop)
    }

    fn set_protocol_version(&self, version: &str) {
        *self
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(version.to_string());
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(session_id) = self
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        // Servers may answer 405 when they do not support explicit teardown.
        let result = self
            .client
            .delete(self.url.clone())
            .header(MCP_SESSION_HEADER, session_id)
            .send()
            .await;
        if let Err(e) = result {
            debug!(url = %self.url, error = %e, "MCP session teardown failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        assert!(StreamableHttpChannel::new(reqwest::Client::new(), "not a url").is_err());
    }

    #[test]
    fn test_matching_ignores_other_ids_and_notifications() {
        assert!(matching(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#, 7).is_some());
        assert!(matching(r#"{"jsonrpc":"2.0","id":8,"result":{}}"#, 7).is_none());
        assert!(matching(r#"{"jsonrpc":"2.0","method":"notifications/message"}"#, 7).is_none());
    }

    #[test]
    fn test_protocol_version_header_after_handshake() {
        let channel =
            StreamableHttpChannel::new(reqwest::Client::new(), "http://localhost:9/mcp").unwrap();
        channel.set_protocol_version("2024-11-05");

        let request = channel.post("{}".to_string()).build().unwrap();
        assert_eq!(
            request.headers()[MCP_PROTOCOL_VERSION_HEADER],
            "2024-11-05"
        );
        assert_eq!(request.headers()["Accept"], MCP_JSON_AND_SSE_ACCEPT);
        assert!(request.headers().get(MCP_SESSION_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let channel =
            StreamableHttpChannel::new(reqwest::Client::new(), "http://127.0.0.1:9/mcp").unwrap();
        let err = channel
            .request("initialize", None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Http(_) | TransportError::Timeout(_)
        ));
    }
}
