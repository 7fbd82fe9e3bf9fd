//! Legacy HTTP+SSE transport.
//!
//! The client holds a GET event stream open. The first `endpoint` event names
//! the URL to POST requests to; responses come back on the stream and are
//! routed to waiting callers by id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use toolhub_core::TransportError;

use super::RpcChannel;
use super::event_stream::{SseDecoder, SseEvent, is_event_stream_content_type};
use super::protocol::{JsonRpcRequest, PendingRequests, notification, parse_message};

pub struct SseChannel {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    pending: Arc<PendingRequests>,
    reader: JoinHandle<()>,
}

impl SseChannel {
    /// Open the event stream and wait for the `endpoint` event.
    pub async fn connect(
        client: reqwest::Client,
        url: &str,
        deadline: Duration,
    ) -> Result<Self, TransportError> {
        let base = reqwest::Url::parse(url)
            .map_err(|e| TransportError::Http(format!("Invalid MCP url '{url}': {e}")))?;

        let response = tokio::time::timeout(
            deadline,
            client
                .get(base.clone())
                .header("Accept", "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| TransportError::Timeout(deadline))?
        .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !is_event_stream_content_type(content_type) {
            return Err(TransportError::Protocol(format!(
                "Expected an event stream, got '{content_type}'"
            )));
        }

        let pending = Arc::new(PendingRequests::new());
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(route_events(
            response,
            base.clone(),
            endpoint_tx,
            Arc::clone(&pending),
        ));

        let endpoint = match tokio::time::timeout(deadline, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(TransportError::Protocol(
                    "Event stream ended before the endpoint event".to_string(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(TransportError::Timeout(deadline));
            }
        };

        debug!(url = %base, endpoint = %endpoint, "MCP SSE stream open");
        Ok(Self {
            client,
            endpoint,
            pending,
            reader,
        })
    }

    async fn post(&self, body: String) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

async fn route_events(
    response: reqwest::Response,
    base: reqwest::Url,
    endpoint_tx: oneshot::Sender<reqwest::Url>,
    pending: Arc<PendingRequests>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(url = %base, error = %e, "MCP SSE stream failed");
                break;
            }
        };
        for event in decoder.push(&chunk) {
            handle_event(&event, &base, &mut endpoint_tx, &pending);
        }
    }
    if let Some(event) = decoder.finish() {
        handle_event(&event, &base, &mut endpoint_tx, &pending);
    }

    debug!(url = %base, "MCP SSE stream closed");
    pending.close();
}

fn handle_event(
    event: &SseEvent,
    base: &reqwest::Url,
    endpoint_tx: &mut Option<oneshot::Sender<reqwest::Url>>,
    pending: &PendingRequests,
) {
    if event.event == "endpoint" {
        match base.join(event.data.trim()) {
            Ok(endpoint) => {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(endpoint);
                }
            }
            Err(e) => warn!(url = %base, error = %e, "Bad MCP SSE endpoint event"),
        }
        return;
    }

    if let Some(message) = parse_message(&event.data)
        && !pending.complete(message)
    {
        debug!(url = %base, "Ignoring unsolicited MCP message");
    }
}

#[async_trait]
impl RpcChannel for SseChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError> {
        let (id, rx) = self.pending.register()?;
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let exchange = async {
            self.post(body).await?;
            rx.await.map_err(|_| TransportError::Closed)
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(Ok(message)) => message.into_result(),
            Ok(Err(e)) => {
                self.pending.cancel(id);
                Err(e)
            }
            Err(_) => {
                self.pending.cancel(id);
                Err(TransportError::Timeout(deadline))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let body = serde_json::to_string(&notification(method, params))?;
        self.post(body).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.reader.abort();
        self.pending.close();
        Ok(())
    }
}

impl Drop for SseChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
