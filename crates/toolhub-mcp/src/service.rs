//! High-level MCP service for managing tool servers.
//!
//! This is the API front ends use. It keeps persisted intent (the registry)
//! and runtime effect (the controller) in step: registry first, controller
//! second, never both locked at once. It is authorization-agnostic; see
//! [`PermissionGate`](crate::gate::PermissionGate) for the caller-side check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use toolhub_core::{
    CallRequest, CallResult, CatalogEntry, ConnectionSnapshot, ControllerSettings, McpErrorInfo,
    McpEvent, McpEventEmitter, McpPromptMessages, McpResourceContents, McpServerConfig,
    McpServerStatus, McpServiceError, McpTool, McpToolResult, OperationKind, ServerCatalog,
    ServerRegistry, TransportFactory,
};

use crate::controller::McpController;

/// Per-server outcome of a fan-out start.
pub type StartReport = Vec<(String, Result<ConnectionSnapshot, McpServiceError>)>;

/// MCP service providing unified access to tool-server management.
///
/// Construct one per process and share it behind an `Arc`.
pub struct McpService {
    registry: Arc<dyn ServerRegistry>,
    factory: Arc<dyn TransportFactory>,
    controller: Arc<McpController>,
    emitter: Arc<dyn McpEventEmitter>,
    catalog: Option<Arc<dyn ServerCatalog>>,
}

impl McpService {
    /// Create a new MCP service with injected dependencies.
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        factory: Arc<dyn TransportFactory>,
        emitter: Arc<dyn McpEventEmitter>,
        settings: ControllerSettings,
    ) -> Self {
        let controller = McpController::new(Arc::clone(&registry), Arc::clone(&factory), settings)
            .with_emitter(Arc::clone(&emitter));
        Self::with_controller(registry, factory, Arc::new(controller), emitter)
    }

    /// Use a preconfigured controller. It must share `registry`.
    pub fn with_controller(
        registry: Arc<dyn ServerRegistry>,
        factory: Arc<dyn TransportFactory>,
        controller: Arc<McpController>,
        emitter: Arc<dyn McpEventEmitter>,
    ) -> Self {
        Self {
            registry,
            factory,
            controller,
            emitter,
            catalog: None,
        }
    }

    /// Attach the catalog consulted by [`discover_servers`](Self::discover_servers).
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn ServerCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub const fn controller(&self) -> &Arc<McpController> {
        &self.controller
    }

    fn request_timeout(&self) -> Duration {
        self.controller.settings().request_timeout
    }

    // =========================================================================
    // Startup / shutdown
    // =========================================================================

    /// Load and validate the registry, start every enabled server
    /// concurrently, then begin health checking.
    ///
    /// Individual start failures are reported, not returned as an error.
    pub async fn initialize(&self) -> Result<StartReport, McpServiceError> {
        self.registry.load().await?;

        let mut configs = self.registry.list().await?;
        if let Err(e) = self.registry.validate().await {
            warn!(error = %e, "Registry contains invalid MCP servers, skipping them");
            configs.retain(|config| match config.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(server_name = %config.name, error = %reason, "Skipping invalid MCP server");
                    false
                }
            });
        }

        let report = self.controller.start_all(configs).await;
        for (name, result) in &report {
            self.emit_start_outcome(name, result);
        }
        self.controller.spawn_health_loop();

        info!(
            started = report.iter().filter(|(_, r)| r.is_ok()).count(),
            failed = report.iter().filter(|(_, r)| r.is_err()).count(),
            "MCP service initialized"
        );
        Ok(report)
    }

    /// Stop the health loop, pending reconnects and every connection.
    pub async fn shutdown(&self) {
        self.controller.stop_all().await;
        info!("MCP service shut down");
    }

    // =========================================================================
    // Server CRUD
    // =========================================================================

    /// Register a server and start it when enabled.
    ///
    /// A failed start is returned as an error but the configuration stays
    /// registered and enabled.
    pub async fn add_server(
        &self,
        config: McpServerConfig,
    ) -> Result<McpServerConfig, McpServiceError> {
        let saved = self.registry.add(config).await?;

        self.emitter
            .emit(McpEvent::server_added(&saved.name, saved.transport));
        info!(
            server_name = %saved.name,
            transport = %saved.transport,
            enabled = saved.enabled,
            "Added MCP server configuration"
        );

        if saved.enabled {
            self.start(&saved).await?;
        }
        Ok(saved)
    }

    pub async fn get_server(&self, name: &str) -> Result<McpServerConfig, McpServiceError> {
        Ok(self.registry.get(name).await?)
    }

    pub async fn list_servers(&self) -> Result<Vec<McpServerConfig>, McpServiceError> {
        Ok(self.registry.list().await?)
    }

    /// Replace a server's configuration, restarting it when enabled.
    pub async fn update_server(
        &self,
        config: McpServerConfig,
    ) -> Result<McpServerConfig, McpServiceError> {
        config.validate().map_err(McpServiceError::InvalidConfig)?;
        // Fail with NotFound before touching the connection
        self.registry.get(&config.name).await?;

        self.stop(&config.name).await;
        let saved = self.registry.update(config).await?;
        info!(server_name = %saved.name, "Updated MCP server configuration");

        if saved.enabled {
            self.start(&saved).await?;
        }
        Ok(saved)
    }

    /// Unregister a server, then close its connection.
    ///
    /// The registry entry goes first so a reconnect already in flight finds
    /// no config and gives up.
    pub async fn remove_server(&self, name: &str) -> Result<McpServerConfig, McpServiceError> {
        let removed = self.registry.remove(name).await?;
        self.stop(name).await;

        self.emitter.emit(McpEvent::server_removed(name));
        info!(server_name = %name, "Removed MCP server configuration");
        Ok(removed)
    }

    pub async fn enable_server(
        &self,
        name: &str,
    ) -> Result<ConnectionSnapshot, McpServiceError> {
        let config = self.registry.set_enabled(name, true).await?;
        self.start(&config).await
    }

    pub async fn disable_server(&self, name: &str) -> Result<McpServerConfig, McpServiceError> {
        let config = self.registry.set_enabled(name, false).await?;
        self.stop(name).await;
        Ok(config)
    }

    /// Stop then start a server with its current configuration.
    pub async fn restart_server(
        &self,
        name: &str,
    ) -> Result<ConnectionSnapshot, McpServiceError> {
        let config = self.registry.get(name).await?;
        if !config.enabled {
            return Err(McpServiceError::Disabled(name.to_string()));
        }
        self.stop(name).await;
        self.start(&config).await
    }

    async fn start(&self, config: &McpServerConfig) -> Result<ConnectionSnapshot, McpServiceError> {
        let result = self.controller.start_server(config).await;
        self.emit_start_outcome(&config.name, &result);
        result
    }

    async fn stop(&self, name: &str) {
        if self.controller.stop_server(name).await {
            self.emitter.emit(McpEvent::server_stopped(name));
        }
    }

    fn emit_start_outcome(&self, name: &str, result: &Result<ConnectionSnapshot, McpServiceError>) {
        match result {
            Ok(snapshot) => self
                .emitter
                .emit(McpEvent::server_started(name, snapshot.tools.len())),
            Err(e) => self
                .emitter
                .emit(McpEvent::server_error(McpErrorInfo::new(name, e))),
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Every registered server merged with its runtime state, by name.
    pub async fn list_server_statuses(&self) -> Result<Vec<McpServerStatus>, McpServiceError> {
        let configs = self.registry.list().await?;
        let mut statuses = Vec::with_capacity(configs.len());
        for config in &configs {
            let connection = self.controller.get_connection(&config.name).await;
            statuses.push(McpServerStatus::merge(config, connection.as_ref()));
        }
        Ok(statuses)
    }

    pub async fn get_server_status(&self, name: &str) -> Result<McpServerStatus, McpServiceError> {
        let config = self.registry.get(name).await?;
        let connection = self.controller.get_connection(name).await;
        Ok(McpServerStatus::merge(&config, connection.as_ref()))
    }

    /// Servers available from the catalog, unmodified.
    pub async fn discover_servers(&self) -> Result<Vec<CatalogEntry>, McpServiceError> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.discover().await?),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Tool Operations
    // =========================================================================

    /// Tools of every connected server, ordered by server name.
    pub async fn list_all_tools(&self) -> Vec<(String, Vec<McpTool>)> {
        self.controller.all_tools().await
    }

    pub async fn list_server_tools(&self, name: &str) -> Result<Vec<McpTool>, McpServiceError> {
        self.controller
            .tools_for(name)
            .await
            .ok_or_else(|| McpServiceError::NotConnected(name.to_string()))
    }

    /// Connect with a throwaway controller, list tools, disconnect.
    ///
    /// The registry and the live connections are untouched.
    pub async fn test_connection(
        &self,
        config: &McpServerConfig,
    ) -> Result<Vec<McpTool>, McpServiceError> {
        config.validate().map_err(McpServiceError::InvalidConfig)?;

        let probe = McpController::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.factory),
            *self.controller.settings(),
        );
        let snapshot = probe.start_server(config).await?;
        probe.stop_server(&config.name).await;
        Ok(snapshot.tools)
    }

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpToolResult, McpServiceError> {
        self.call_tool_within(server, tool, arguments, self.request_timeout())
            .await
    }

    pub async fn get_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<McpResourceContents, McpServiceError> {
        self.get_resource_within(server, uri, self.request_timeout())
            .await
    }

    pub async fn get_prompt(
        &self,
        server: &str,
        prompt: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<McpPromptMessages, McpServiceError> {
        self.get_prompt_within(server, prompt, arguments, self.request_timeout())
            .await
    }

    /// Route a [`CallRequest`] to the matching operation.
    pub async fn dispatch(&self, request: CallRequest) -> Result<CallResult, McpServiceError> {
        let deadline = request.timeout.unwrap_or_else(|| self.request_timeout());
        match request.kind {
            OperationKind::Tool => self
                .call_tool_within(&request.server, &request.name, request.arguments, deadline)
                .await
                .map(CallResult::Tool),
            OperationKind::Resource => self
                .get_resource_within(&request.server, &request.name, deadline)
                .await
                .map(CallResult::Resource),
            OperationKind::Prompt => self
                .get_prompt_within(&request.server, &request.name, request.arguments, deadline)
                .await
                .map(CallResult::Prompt),
        }
    }

    async fn call_tool_within(
        &self,
        server: &str,
        tool: &str,
        arguments: HashMap<String, Value>,
        deadline: Duration,
    ) -> Result<McpToolResult, McpServiceError> {
        let connection = self.live(server, OperationKind::Tool).await?;

        match connection.tools.iter().find(|t| t.name == tool) {
            Some(known) => require_keys(
                server,
                tool,
                known.required_arguments().into_iter(),
                &arguments,
            )?,
            None if !connection.tools.is_empty() => {
                return Err(McpServiceError::Validation(format!(
                    "Server '{server}' has no tool '{tool}'"
                )));
            }
            // Discovery came back empty; let the server decide.
            None => {}
        }

        self.controller
            .call_tool(server, tool, arguments, deadline)
            .await
    }

    async fn get_resource_within(
        &self,
        server: &str,
        uri: &str,
        deadline: Duration,
    ) -> Result<McpResourceContents, McpServiceError> {
        self.live(server, OperationKind::Resource).await?;
        if uri.trim().is_empty() {
            return Err(McpServiceError::Validation(
                "Resource uri cannot be empty".to_string(),
            ));
        }
        self.controller.read_resource(server, uri, deadline).await
    }

    async fn get_prompt_within(
        &self,
        server: &str,
        prompt: &str,
        arguments: HashMap<String, Value>,
        deadline: Duration,
    ) -> Result<McpPromptMessages, McpServiceError> {
        let connection = self.live(server, OperationKind::Prompt).await?;

        match connection.prompts.iter().find(|p| p.name == prompt) {
            Some(known) => require_keys(server, prompt, known.required_arguments(), &arguments)?,
            None if !connection.prompts.is_empty() => {
                return Err(McpServiceError::Validation(format!(
                    "Server '{server}' has no prompt '{prompt}'"
                )));
            }
            None => {}
        }

        // Prompt arguments are strings on the wire.
        let arguments = arguments
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect();

        self.controller
            .get_prompt(server, prompt, arguments, deadline)
            .await
    }

    /// Snapshot of a connected server whose config allows `kind`.
    async fn live(
        &self,
        server: &str,
        kind: OperationKind,
    ) -> Result<ConnectionSnapshot, McpServiceError> {
        let connection = self
            .controller
            .get_connection(server)
            .await
            .filter(|c| c.state.is_connected())
            .ok_or_else(|| McpServiceError::NotConnected(server.to_string()))?;

        let config = self.registry.get(server).await?;
        if !config.capabilities.allows(kind) {
            return Err(McpServiceError::Validation(format!(
                "{kind} operations are disabled for server '{server}'"
            )));
        }
        Ok(connection)
    }
}

fn require_keys<'a>(
    server: &str,
    target: &str,
    required: impl Iterator<Item = &'a str>,
    arguments: &HashMap<String, Value>,
) -> Result<(), McpServiceError> {
    let missing: Vec<&str> = required
        .filter(|key| !arguments.contains_key(*key))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(McpServiceError::Validation(format!(
        "'{target}' on server '{server}' is missing required arguments: {}",
        missing.join(", ")
    )))
}
