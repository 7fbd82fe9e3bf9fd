//! Runtime lifecycle of tool-server connections.
//!
//! The controller owns the runtime table (one entry per started server) and
//! the two background timers: a periodic health check and a one-shot
//! reconnect per failure. It never persists anything; desired state is read
//! from the registry when a reconnect fires.
//!
//! # Locking
//!
//! - One `RwLock` over the table. Transport handles are cloned out under the
//!   read lock and used after it is released.
//! - One async mutex per server name orders start/stop/reconnect for that name.
//! - The registry is never called while the table lock is held.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use toolhub_core::{
    AdvertisedCapabilities, ClientInfo, ConnectTarget, ConnectionSnapshot, ConnectionState,
    ControllerSettings, LaunchSpec, McpErrorInfo, McpEvent, McpEventEmitter, McpPrompt,
    McpPromptMessages, McpResource, McpResourceContents, McpServerConfig, McpServiceError,
    McpTool, McpToolResult, McpTransport, NoopEmitter, RegistryError, ServerRegistry,
    TransportError, TransportFactory,
};

use crate::env::{EnvProvider, SystemEnv};
use crate::shell;

/// Runtime entry for one server.
struct ServerConnection {
    state: ConnectionState,
    last_seen: Option<DateTime<Utc>>,
    tools: Vec<McpTool>,
    resources: Vec<McpResource>,
    prompts: Vec<McpPrompt>,
    /// Present only while Connected.
    handle: Option<Arc<dyn McpTransport>>,
    reconnect_pending: bool,
}

impl ServerConnection {
    fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            last_seen: None,
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            handle: None,
            reconnect_pending: false,
        }
    }

    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            ..Self::connecting()
        }
    }

    fn snapshot(&self, name: &str) -> ConnectionSnapshot {
        ConnectionSnapshot {
            name: name.to_string(),
            state: self.state,
            last_seen: self.last_seen,
            tools: self.tools.clone(),
            resources: self.resources.clone(),
            prompts: self.prompts.clone(),
        }
    }
}

/// Work the health check decided on for one server.
enum HealthAction {
    Probe(String, Arc<dyn McpTransport>),
    Reconnect(String),
}

/// Connection lifecycle manager.
///
/// Create with [`McpController::new`], wrap in an `Arc`, then call
/// [`spawn_health_loop`](Self::spawn_health_loop). Call
/// [`stop_all`](Self::stop_all) before dropping; background tasks hold a
/// reference until cancelled.
pub struct McpController {
    registry: Arc<dyn ServerRegistry>,
    factory: Arc<dyn TransportFactory>,
    emitter: Arc<dyn McpEventEmitter>,
    env: Arc<dyn EnvProvider>,
    settings: ControllerSettings,
    client_info: ClientInfo,
    connections: RwLock<HashMap<String, ServerConnection>>,
    /// Enabled servers with no runtime entry and a retry already scheduled.
    retrying: StdMutex<HashSet<String>>,
    lifecycle: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl McpController {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        factory: Arc<dyn TransportFactory>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            registry,
            factory,
            emitter: Arc::new(NoopEmitter::new()),
            env: Arc::new(SystemEnv),
            settings,
            client_info: ClientInfo::default(),
            connections: RwLock::new(HashMap::new()),
            retrying: StdMutex::new(HashSet::new()),
            lifecycle: StdMutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn McpEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    #[must_use]
    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    /// Environment used for `$HOME` / `$USER` in launch commands.
    #[must_use]
    pub fn with_env_provider(mut self, env: Arc<dyn EnvProvider>) -> Self {
        self.env = env;
        self
    }

    pub const fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    fn lifecycle_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    // =========================================================================
    // Start / stop
    // =========================================================================

    /// Connect a server and discover its capabilities.
    ///
    /// Any existing connection for the name is closed first. On failure no
    /// entry is left behind. Fails with [`McpServiceError::ShutDown`] once
    /// [`stop_all`](Self::stop_all) has begun.
    pub async fn start_server(
        &self,
        config: &McpServerConfig,
    ) -> Result<ConnectionSnapshot, McpServiceError> {
        let lock = self.lifecycle_lock(&config.name);
        let _guard = lock.lock().await;
        self.start_locked(config).await
    }

    async fn start_locked(
        &self,
        config: &McpServerConfig,
    ) -> Result<ConnectionSnapshot, McpServiceError> {
        let name = config.name.as_str();
        self.detach(name).await;

        let target = self.connect_target(config)?;
        let deadline = config
            .timeout_secs
            .map_or(self.settings.connect_timeout, Duration::from_secs);

        {
            let mut connections = self.connections.write().await;
            if self.cancel.is_cancelled() {
                return Err(McpServiceError::ShutDown(name.to_string()));
            }
            connections.insert(name.to_string(), ServerConnection::connecting());
        }

        let (transport, advertised) = match self.handshake(name, &target, deadline).await {
            Ok(connected) => connected,
            Err(e) => {
                self.connections.write().await.remove(name);
                return Err(e);
            }
        };

        let (tools, resources, prompts) = self
            .discover(name, &transport, config, advertised, deadline)
            .await;

        let entry = ServerConnection {
            state: ConnectionState::Connected,
            last_seen: Some(Utc::now()),
            tools,
            resources,
            prompts,
            handle: Some(transport),
            reconnect_pending: false,
        };
        let snapshot = entry.snapshot(name);
        {
            // stop_all reads the table only after cancelling.
            let mut connections = self.connections.write().await;
            if self.cancel.is_cancelled() {
                connections.remove(name);
                drop(connections);
                if let Some(handle) = entry.handle {
                    close_quietly(name, handle.as_ref()).await;
                }
                return Err(McpServiceError::ShutDown(name.to_string()));
            }
            connections.insert(name.to_string(), entry);
        }

        info!(
            server_name = %name,
            transport = %config.transport,
            tool_count = snapshot.tools.len(),
            resource_count = snapshot.resources.len(),
            prompt_count = snapshot.prompts.len(),
            "MCP server started"
        );
        Ok(snapshot)
    }

    fn connect_target(&self, config: &McpServerConfig) -> Result<ConnectTarget, McpServiceError> {
        if config.transport.is_local() {
            // Each element may itself be a full command line.
            let argv: Vec<String> = config
                .command
                .iter()
                .chain(&config.args)
                .flat_map(|part| shell::parse_with(part, self.env.as_ref()))
                .collect();
            let Some((program, args)) = argv.split_first() else {
                return Err(McpServiceError::InvalidConfig(format!(
                    "Local server '{}' has an empty launch command",
                    config.name
                )));
            };

            return Ok(ConnectTarget::Process(LaunchSpec {
                program: program.clone(),
                args: args.to_vec(),
                env: config
                    .env
                    .iter()
                    .map(|e| (e.key.clone(), e.value.clone()))
                    .collect(),
                working_dir: config.working_dir.clone().filter(|d| !d.is_empty()),
            }));
        }

        let url = config
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                McpServiceError::InvalidConfig(format!(
                    "{} server '{}' requires a url",
                    config.transport, config.name
                ))
            })?;
        Ok(ConnectTarget::Endpoint {
            kind: config.transport,
            url,
        })
    }

    async fn handshake(
        &self,
        name: &str,
        target: &ConnectTarget,
        deadline: Duration,
    ) -> Result<(Arc<dyn McpTransport>, AdvertisedCapabilities), McpServiceError> {
        let attempt = async {
            let transport = self.factory.connect(name, target, deadline).await?;
            match transport.initialize(deadline, &self.client_info).await {
                Ok(init) => Ok((transport, init.capabilities)),
                Err(e) => {
                    if let Err(close_err) = transport.close().await {
                        debug!(server_name = %name, error = %close_err, "Close after failed handshake");
                    }
                    Err(e)
                }
            }
        };
        bounded(name, "initialize", deadline, attempt).await
    }

    async fn discover(
        &self,
        name: &str,
        transport: &Arc<dyn McpTransport>,
        config: &McpServerConfig,
        advertised: AdvertisedCapabilities,
        deadline: Duration,
    ) -> (Vec<McpTool>, Vec<McpResource>, Vec<McpPrompt>) {
        let wanted = config.capabilities;
        let tools = async {
            if wanted.tools && advertised.tools {
                best_effort(name, "tools/list", deadline, transport.list_tools(deadline)).await
            } else {
                Vec::new()
            }
        };
        let resources = async {
            if wanted.resources && advertised.resources {
                best_effort(
                    name,
                    "resources/list",
                    deadline,
                    transport.list_resources(deadline),
                )
                .await
            } else {
                Vec::new()
            }
        };
        let prompts = async {
            if wanted.prompts && advertised.prompts {
                best_effort(
                    name,
                    "prompts/list",
                    deadline,
                    transport.list_prompts(deadline),
                )
                .await
            } else {
                Vec::new()
            }
        };
        tokio::join!(tools, resources, prompts)
    }

    /// Close and forget a server's connection. Returns whether one existed.
    pub async fn stop_server(&self, name: &str) -> bool {
        let lock = self.lifecycle_lock(name);
        let _guard = lock.lock().await;
        self.detach(name).await
    }

    async fn detach(&self, name: &str) -> bool {
        let Some(entry) = self.connections.write().await.remove(name) else {
            return false;
        };
        if let Some(handle) = entry.handle {
            close_quietly(name, handle.as_ref()).await;
        }
        info!(server_name = %name, "MCP server stopped");
        true
    }

    /// Start every enabled config concurrently. One failure never blocks
    /// the others; results come back ordered by name.
    pub async fn start_all(
        self: &Arc<Self>,
        configs: Vec<McpServerConfig>,
    ) -> Vec<(String, Result<ConnectionSnapshot, McpServiceError>)> {
        let mut tasks = JoinSet::new();
        for config in configs.into_iter().filter(|c| c.enabled) {
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let result = this.start_server(&config).await;
                (config.name, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, result)) => {
                    if let Err(ref e) = result {
                        warn!(server_name = %name, error = %e, "Failed to start MCP server");
                    }
                    results.push((name, result));
                }
                Err(e) => warn!(error = %e, "MCP server start task failed"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Cancel background timers, wait for them, then stop every server.
    ///
    /// The controller is finished afterwards: later starts fail with
    /// [`McpServiceError::ShutDown`].
    pub async fn stop_all(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        join_all(names.iter().map(|name| self.stop_server(name))).await;
        self.connections.write().await.clear();
        self.retrying_set().clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn retrying_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.retrying.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Health check and reconnect
    // =========================================================================

    /// Run [`health_tick`](Self::health_tick) every interval until
    /// [`stop_all`](Self::stop_all).
    pub fn spawn_health_loop(self: &Arc<Self>) {
        if self.is_shut_down() {
            warn!("MCP health loop not started: controller is shut down");
            return;
        }
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut ticker = interval(this.settings.health_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = this.cancel.cancelled() => break,
                    _ = ticker.tick() => this.health_tick().await,
                }
            }
            debug!("MCP health loop stopped");
        });
    }

    /// Probe every connected server once and schedule reconnects for the
    /// ones that are down, including enabled servers whose start failed.
    pub async fn health_tick(self: &Arc<Self>) {
        let registered: HashMap<String, bool> = match self.registry.list().await {
            Ok(configs) => configs.into_iter().map(|c| (c.name, c.enabled)).collect(),
            Err(e) => {
                warn!(error = %e, "Health check skipped: registry unavailable");
                return;
            }
        };

        let actions: Vec<HealthAction> = {
            let mut connections = self.connections.write().await;
            let never_started: Vec<HealthAction> = {
                let mut retrying = self.retrying_set();
                registered
                    .iter()
                    .filter(|(name, enabled)| **enabled && !connections.contains_key(*name))
                    .filter(|(name, _)| retrying.insert((*name).clone()))
                    .map(|(name, _)| HealthAction::Reconnect(name.clone()))
                    .collect()
            };
            connections
                .iter_mut()
                .filter(|(name, _)| registered.contains_key(*name))
                .filter_map(|(name, entry)| match (entry.state, &entry.handle) {
                    (ConnectionState::Connected, Some(handle)) => {
                        Some(HealthAction::Probe(name.clone(), Arc::clone(handle)))
                    }
                    (ConnectionState::Disconnected, _) if !entry.reconnect_pending => {
                        entry.reconnect_pending = true;
                        Some(HealthAction::Reconnect(name.clone()))
                    }
                    _ => None,
                })
                .chain(never_started)
                .collect()
        };

        let probe_timeout = self.settings.health_probe_timeout;
        join_all(actions.into_iter().map(|action| async move {
            match action {
                HealthAction::Probe(name, handle) => {
                    let healthy = matches!(
                        timeout(probe_timeout, handle.list_tools(probe_timeout)).await,
                        Ok(Ok(_))
                    );
                    if healthy {
                        self.mark_seen(&name, &handle).await;
                    } else {
                        self.mark_disconnected(&name, &handle).await;
                    }
                }
                HealthAction::Reconnect(name) => self.schedule_reconnect(name),
            }
        }))
        .await;
    }

    async fn mark_seen(&self, name: &str, handle: &Arc<dyn McpTransport>) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(name)
            && entry.handle.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle))
        {
            entry.last_seen = Some(Utc::now());
        }
    }

    async fn mark_disconnected(self: &Arc<Self>, name: &str, handle: &Arc<dyn McpTransport>) {
        let taken = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(name) {
                // Restarted or stopped while the probe was in flight
                Some(entry) if entry.handle.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle)) => {
                    let taken = entry.handle.take();
                    *entry = ServerConnection::disconnected();
                    entry.reconnect_pending = true;
                    taken
                }
                _ => return,
            }
        };

        warn!(server_name = %name, "MCP health check failed, disconnecting");
        if let Some(taken) = taken {
            close_quietly(name, taken.as_ref()).await;
        }
        self.emitter.emit(McpEvent::server_disconnected(name));
        self.schedule_reconnect(name.to_string());
    }

    /// Reconnect `name` once after the configured delay.
    fn schedule_reconnect(self: &Arc<Self>, name: String) {
        let this = Arc::clone(self);
        let delay = self.settings.reconnect_delay;
        debug!(server_name = %name, delay_secs = delay.as_secs_f64(), "Scheduling MCP reconnect");
        self.tracker.spawn(async move {
            tokio::select! {
                () = this.cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => this.reconnect(&name).await,
            }
        });
    }

    async fn reconnect(&self, name: &str) {
        let lock = self.lifecycle_lock(name);
        let _guard = lock.lock().await;

        // A server whose start failed has no entry; the tick that scheduled
        // this retry marked it instead.
        let never_started = self.retrying_set().remove(name);
        let still_down = match self.connections.read().await.get(name) {
            Some(entry) => entry.state == ConnectionState::Disconnected,
            None => never_started,
        };
        if !still_down {
            debug!(server_name = %name, "Reconnect skipped: server was restarted or stopped");
            return;
        }

        let config = match self.registry.get(name).await {
            Ok(config) if config.enabled => config,
            Ok(_) | Err(RegistryError::NotFound(_)) => {
                debug!(server_name = %name, "Reconnect dropped: server removed or disabled");
                self.connections.write().await.remove(name);
                return;
            }
            Err(e) => {
                warn!(server_name = %name, error = %e, "Reconnect deferred: registry unavailable");
                if !never_started {
                    self.leave_disconnected(name).await;
                }
                return;
            }
        };

        if never_started && let Err(reason) = config.validate() {
            debug!(server_name = %name, error = %reason, "Retry skipped: invalid configuration");
            return;
        }

        match self.start_locked(&config).await {
            Ok(snapshot) => {
                info!(server_name = %name, "MCP server reconnected");
                self.emitter
                    .emit(McpEvent::server_reconnected(name, snapshot.tools.len()));
            }
            Err(McpServiceError::ShutDown(_)) => {
                debug!(server_name = %name, "Reconnect abandoned: controller shut down");
            }
            Err(e) => {
                warn!(server_name = %name, error = %e, "MCP reconnect failed");
                self.emitter
                    .emit(McpEvent::server_error(McpErrorInfo::new(name, &e)));
                // Never-started servers stay absent and are picked up again
                // by the next tick.
                if !never_started {
                    self.leave_disconnected(name).await;
                }
            }
        }
    }

    /// Leave a handle-less Disconnected entry for the next health tick.
    async fn leave_disconnected(&self, name: &str) {
        let mut connections = self.connections.write().await;
        if !self.cancel.is_cancelled() {
            connections.insert(name.to_string(), ServerConnection::disconnected());
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_connection(&self, name: &str) -> Option<ConnectionSnapshot> {
        self.connections
            .read()
            .await
            .get(name)
            .map(|entry| entry.snapshot(name))
    }

    /// Snapshots of registered servers that have a runtime entry, in
    /// registry order. Stopped servers are absent.
    pub async fn list_connections(&self) -> Result<Vec<ConnectionSnapshot>, McpServiceError> {
        let names: Vec<String> = self
            .registry
            .list()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();

        let connections = self.connections.read().await;
        Ok(names
            .iter()
            .filter_map(|name| connections.get(name).map(|entry| entry.snapshot(name)))
            .collect())
    }

    pub async fn is_connected(&self, name: &str) -> bool {
        self.connections
            .read()
            .await
            .get(name)
            .is_some_and(|entry| entry.state.is_connected())
    }

    /// Tools discovered on a connected server.
    pub async fn tools_for(&self, name: &str) -> Option<Vec<McpTool>> {
        self.connections
            .read()
            .await
            .get(name)
            .filter(|entry| entry.state.is_connected())
            .map(|entry| entry.tools.clone())
    }

    /// Tools of every connected server, ordered by server name.
    pub async fn all_tools(&self) -> Vec<(String, Vec<McpTool>)> {
        let mut all: Vec<(String, Vec<McpTool>)> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.state.is_connected())
            .map(|(name, entry)| (name.clone(), entry.tools.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    // =========================================================================
    // Proxied calls
    // =========================================================================

    async fn handle(&self, name: &str) -> Result<Arc<dyn McpTransport>, McpServiceError> {
        self.connections
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.handle.clone())
            .ok_or_else(|| McpServiceError::NotConnected(name.to_string()))
    }

    pub async fn call_tool(
        &self,
        name: &str,
        tool: &str,
        arguments: HashMap<String, serde_json::Value>,
        deadline: Duration,
    ) -> Result<McpToolResult, McpServiceError> {
        let handle = self.handle(name).await?;
        bounded(
            name,
            "tools/call",
            deadline,
            handle.call_tool(deadline, tool, arguments),
        )
        .await
    }

    pub async fn read_resource(
        &self,
        name: &str,
        uri: &str,
        deadline: Duration,
    ) -> Result<McpResourceContents, McpServiceError> {
        let handle = self.handle(name).await?;
        bounded(
            name,
            "resources/read",
            deadline,
            handle.read_resource(deadline, uri),
        )
        .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        prompt: &str,
        arguments: HashMap<String, String>,
        deadline: Duration,
    ) -> Result<McpPromptMessages, McpServiceError> {
        let handle = self.handle(name).await?;
        bounded(
            name,
            "prompts/get",
            deadline,
            handle.get_prompt(deadline, prompt, arguments),
        )
        .await
    }
}

/// Enforce `deadline` on a transport call and attach server context.
async fn bounded<T>(
    name: &str,
    operation: &str,
    deadline: Duration,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, McpServiceError> {
    match timeout(deadline, call).await {
        Ok(result) => result.map_err(|e| McpServiceError::transport(name, operation, e)),
        Err(_) => Err(McpServiceError::Timeout {
            server: name.to_string(),
            operation: operation.to_string(),
            timeout: deadline,
        }),
    }
}

async fn best_effort<T>(
    name: &str,
    operation: &str,
    deadline: Duration,
    call: impl Future<Output = Result<Vec<T>, TransportError>>,
) -> Vec<T> {
    match bounded(name, operation, deadline, call).await {
        Ok(items) => items,
        Err(e) => {
            warn!(server_name = %name, error = %e, "MCP discovery failed, continuing without");
            Vec::new()
        }
    }
}

async fn close_quietly(name: &str, handle: &dyn McpTransport) {
    if let Err(e) = handle.close().await {
        warn!(server_name = %name, error = %e, "Failed to close MCP connection");
    }
}
