//! Shared fixtures for toolhub-mcp integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use toolhub_core::{
    AdvertisedCapabilities, ClientInfo, ConnectTarget, ControllerSettings, InitializeResult,
    McpEvent, McpEventEmitter, McpPrompt, McpPromptMessages, McpResource, McpResourceContents,
    McpTool, McpToolResult, McpTransport, TransportError, TransportFactory,
};
use toolhub_store::JsonFileRegistry;

/// Observable state shared by a [`StubFactory`] and every transport it opens.
#[derive(Default)]
pub struct StubState {
    /// When false, connects and probes fail.
    unhealthy: AtomicBool,
    /// Programs whose connect attempt fails.
    failing_programs: Mutex<HashSet<String>>,
    /// Open handles per server name.
    open: Mutex<HashMap<String, usize>>,
    /// Highest simultaneous open count seen for any one name.
    peak_open: AtomicUsize,
    connects: AtomicUsize,
    calls: AtomicUsize,
}

impl StubState {
    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    fn healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }

    pub fn fail_program(&self, program: &str) {
        self.failing_programs
            .lock()
            .unwrap()
            .insert(program.to_string());
    }

    pub fn open_handles(&self, name: &str) -> usize {
        self.open.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Proxied operations (tool calls, resource reads, prompt gets).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn opened(&self, name: &str) {
        let mut open = self.open.lock().unwrap();
        let count = open.entry(name.to_string()).or_default();
        *count += 1;
        self.peak_open.fetch_max(*count, Ordering::SeqCst);
    }

    fn closed(&self, name: &str) {
        if let Some(count) = self.open.lock().unwrap().get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Factory producing in-memory transports that advertise two tools, one
/// resource and one prompt.
#[derive(Clone, Default)]
pub struct StubFactory {
    pub state: Arc<StubState>,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransportFactory for StubFactory {
    async fn connect(
        &self,
        server_name: &str,
        target: &ConnectTarget,
        _deadline: Duration,
    ) -> Result<Arc<dyn McpTransport>, TransportError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        if let ConnectTarget::Process(spec) = target
            && self
                .state
                .failing_programs
                .lock()
                .unwrap()
                .contains(&spec.program)
        {
            return Err(TransportError::SpawnFailed(format!(
                "{}: not found",
                spec.program
            )));
        }
        if !self.state.healthy() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        self.state.opened(server_name);
        Ok(Arc::new(StubTransport {
            server_name: server_name.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct StubTransport {
    server_name: String,
    state: Arc<StubState>,
    closed: AtomicBool,
}

impl StubTransport {
    fn check(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.state.healthy() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        Ok(())
    }
}

pub fn advertised_tools() -> Vec<McpTool> {
    vec![
        McpTool::new("read_file").with_input_schema(json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })),
        McpTool::new("list_dir"),
    ]
}

#[async_trait]
impl McpTransport for StubTransport {
    async fn initialize(
        &self,
        _deadline: Duration,
        _client: &ClientInfo,
    ) -> Result<InitializeResult, TransportError> {
        self.check()?;
        Ok(InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            server_name: Some(self.server_name.clone()),
            server_version: None,
            capabilities: AdvertisedCapabilities::all(),
        })
    }

    async fn list_tools(&self, _deadline: Duration) -> Result<Vec<McpTool>, TransportError> {
        self.check()?;
        Ok(advertised_tools())
    }

    async fn list_resources(
        &self,
        _deadline: Duration,
    ) -> Result<Vec<McpResource>, TransportError> {
        self.check()?;
        Ok(vec![McpResource::new("file:///workspace/README.md", "README")])
    }

    async fn list_prompts(&self, _deadline: Duration) -> Result<Vec<McpPrompt>, TransportError> {
        self.check()?;
        Ok(vec![McpPrompt::new("summarize").with_argument("topic", true)])
    }

    async fn call_tool(
        &self,
        _deadline: Duration,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, TransportError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(McpToolResult::success(
            json!({ "tool": name, "arguments": arguments }),
        ))
    }

    async fn read_resource(
        &self,
        _deadline: Duration,
        uri: &str,
    ) -> Result<McpResourceContents, TransportError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(McpResourceContents {
            uri: uri.to_string(),
            contents: vec![json!({ "uri": uri, "text": "hello" })],
        })
    }

    async fn get_prompt(
        &self,
        _deadline: Duration,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<McpPromptMessages, TransportError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(McpPromptMessages {
            description: Some(name.to_string()),
            messages: vec![json!({ "role": "user", "content": arguments })],
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed(&self.server_name);
        }
        Ok(())
    }
}

/// Emitter that records every event.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<McpEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<McpEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl McpEventEmitter for RecordingEmitter {
    fn emit(&self, event: McpEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Short timers so health and reconnect tests finish quickly.
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        health_check_interval: Duration::from_millis(200),
        health_probe_timeout: Duration::from_millis(100),
        reconnect_delay: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
    }
}

pub fn temp_registry() -> (TempDir, Arc<JsonFileRegistry>) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(JsonFileRegistry::new(dir.path().join("mcp-servers.json")));
    (dir, registry)
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
