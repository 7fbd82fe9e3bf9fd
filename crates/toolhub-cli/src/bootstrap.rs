//! CLI bootstrap - the composition root.
//!
//! This is the only place where concrete adapters are wired together:
//! - JSON file registry and catalog (via toolhub-store)
//! - Default transport factory (via toolhub-mcp)
//! - MCP service and permission gate (via toolhub-mcp)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use toolhub_core::paths::CONFIG_DIR_NAME;
use toolhub_core::{McpEvent, McpEventEmitter, ServerRegistry, registry_path, resolve_workspace_root};
use toolhub_mcp::{DefaultTransportFactory, McpService, PermissionGate};
use toolhub_store::{CATALOG_FILE_NAME, JsonFileCatalog, JsonFileRegistry};

use crate::policy::PathPolicy;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub workspace_root: PathBuf,
}

impl CliConfig {
    /// Resolve the workspace from an explicit flag, the environment, or the
    /// current directory.
    pub fn resolve(workspace: Option<&str>) -> Result<Self> {
        let workspace_root =
            resolve_workspace_root(workspace).context("Cannot resolve workspace root")?;
        Ok(Self { workspace_root })
    }

    pub fn registry_path(&self) -> PathBuf {
        registry_path(&self.workspace_root)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.workspace_root
            .join(CONFIG_DIR_NAME)
            .join(CATALOG_FILE_NAME)
    }
}

/// Emitter that turns lifecycle events into log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmitter;

impl McpEventEmitter for LogEmitter {
    fn emit(&self, event: McpEvent) {
        match event {
            McpEvent::ServerError { error } => warn!(
                server_name = %error.server_name,
                category = ?error.category,
                "{}",
                error.message
            ),
            McpEvent::ServerDisconnected { server_name } => {
                warn!(server_name = %server_name, "MCP server disconnected");
            }
            other => info!(event = ?other, "MCP event"),
        }
    }
}

/// Fully composed application context for CLI commands.
pub struct CliContext {
    pub config: CliConfig,
    pub registry: Arc<JsonFileRegistry>,
    pub mcp: Arc<McpService>,
}

impl CliContext {
    pub const fn mcp(&self) -> &Arc<McpService> {
        &self.mcp
    }

    /// Gate enforcing each server's path allow/deny lists.
    pub async fn gate(&self) -> Result<PermissionGate> {
        let configs = self.registry.list().await?;
        Ok(PermissionGate::new(
            Arc::new(PathPolicy::new(configs)),
            Arc::clone(&self.mcp),
        ))
    }
}

/// Open the registry, read its timing settings and build the MCP service.
///
/// Servers are not started here; commands that need live connections start
/// them explicitly.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext> {
    let path = config.registry_path();
    let registry = Arc::new(
        JsonFileRegistry::open(&path)
            .await
            .with_context(|| format!("Failed to open registry {}", path.display()))?,
    );

    let global = registry.settings().await?;
    global.validate().context("Invalid registry settings")?;

    let mcp = McpService::new(
        Arc::clone(&registry) as Arc<dyn ServerRegistry>,
        Arc::new(DefaultTransportFactory::new()),
        Arc::new(LogEmitter),
        global.controller_settings(),
    )
    .with_catalog(Arc::new(JsonFileCatalog::new(config.catalog_path())));

    Ok(CliContext {
        config,
        registry,
        mcp: Arc::new(mcp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_empty_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::resolve(dir.path().to_str()).unwrap();
        assert_eq!(
            config.registry_path(),
            dir.path().join(".toolhub").join("mcp-servers.json")
        );

        let ctx = bootstrap(config).await.unwrap();
        assert!(ctx.mcp().list_servers().await.unwrap().is_empty());
        assert!(ctx.mcp().discover_servers().await.unwrap().is_empty());
    }
}
