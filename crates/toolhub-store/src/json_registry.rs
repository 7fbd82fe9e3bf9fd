//! JSON file implementation of [`ServerRegistry`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info};

use toolhub_core::settings::GlobalSettings;
use toolhub_core::{McpServerConfig, RegistryError, ServerRegistry};

use crate::document::RegistryDocument;

#[derive(Debug, Clone, Default)]
struct RegistryState {
    settings: GlobalSettings,
    servers: BTreeMap<String, McpServerConfig>,
}

/// Registry backed by a single JSON document.
///
/// Every mutation works on a copy of the table, persists it, and only then
/// replaces the in-memory state, so a failed write leaves both sides intact.
pub struct JsonFileRegistry {
    path: PathBuf,
    state: RwLock<RegistryState>,
}

impl JsonFileRegistry {
    /// Create a registry for `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Create a registry and load the document at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry = Self::new(path);
        registry.load().await?;
        Ok(registry)
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to a copy of the state, persist, then commit.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        write_document(&self.path, &next).await?;
        *guard = next;
        Ok(out)
    }
}

async fn read_document(path: &Path) -> Result<RegistryState, RegistryError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Registry file missing, starting empty");
            return Ok(RegistryState::default());
        }
        Err(e) => {
            return Err(RegistryError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let document: RegistryDocument = serde_json::from_str(&contents).map_err(|e| {
        RegistryError::Serialization(format!("Failed to parse {}: {e}", path.display()))
    })?;
    let document = document.decode()?;

    Ok(RegistryState {
        settings: document.settings,
        servers: document.servers,
    })
}

async fn write_document(path: &Path, state: &RegistryState) -> Result<(), RegistryError> {
    let document = RegistryDocument::encode(&state.settings, &state.servers);
    let contents = serde_json::to_string_pretty(&document)
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || persist_atomically(&path, contents.as_bytes()))
        .await
        .map_err(|e| RegistryError::Storage(format!("Registry write task failed: {e}")))?
}

/// Write via a temp file in the same directory, then rename over the target.
fn persist_atomically(path: &Path, contents: &[u8]) -> Result<(), RegistryError> {
    let storage = |e: std::io::Error| RegistryError::Storage(format!("{}: {e}", path.display()));

    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = parent {
        std::fs::create_dir_all(dir).map_err(storage)?;
    }

    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(storage)?;

    temp_file.write_all(contents).map_err(storage)?;
    temp_file.as_file_mut().sync_all().map_err(storage)?;
    temp_file.persist(path).map_err(|e| storage(e.error))?;
    Ok(())
}

#[async_trait]
impl ServerRegistry for JsonFileRegistry {
    async fn load(&self) -> Result<(), RegistryError> {
        let loaded = read_document(&self.path).await?;
        info!(
            path = %self.path.display(),
            servers = loaded.servers.len(),
            "Loaded MCP server registry"
        );
        *self.state.write().await = loaded;
        Ok(())
    }

    async fn save(&self) -> Result<(), RegistryError> {
        let guard = self.state.read().await;
        write_document(&self.path, &guard).await
    }

    async fn add(&self, mut config: McpServerConfig) -> Result<McpServerConfig, RegistryError> {
        config.validate().map_err(RegistryError::Validation)?;
        let now = Utc::now();
        config.created_at = now;
        config.updated_at = now;

        self.mutate(|state| {
            if state.servers.contains_key(&config.name) {
                return Err(RegistryError::AlreadyExists(config.name.clone()));
            }
            state.servers.insert(config.name.clone(), config.clone());
            Ok(config)
        })
        .await
    }

    async fn get(&self, name: &str) -> Result<McpServerConfig, RegistryError> {
        self.state
            .read()
            .await
            .servers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<McpServerConfig>, RegistryError> {
        Ok(self.state.read().await.servers.values().cloned().collect())
    }

    async fn update(&self, mut config: McpServerConfig) -> Result<McpServerConfig, RegistryError> {
        config.validate().map_err(RegistryError::Validation)?;

        self.mutate(|state| {
            let existing = state
                .servers
                .get_mut(&config.name)
                .ok_or_else(|| RegistryError::NotFound(config.name.clone()))?;
            config.created_at = existing.created_at;
            config.updated_at = Utc::now();
            existing.clone_from(&config);
            Ok(config)
        })
        .await
    }

    async fn remove(&self, name: &str) -> Result<McpServerConfig, RegistryError> {
        self.mutate(|state| {
            state
                .servers
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))
        })
        .await
    }

    async fn set_enabled(
        &self,
        name: &str,
        enabled: bool,
    ) -> Result<McpServerConfig, RegistryError> {
        self.mutate(|state| {
            let existing = state
                .servers
                .get_mut(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            existing.enabled = enabled;
            existing.updated_at = Utc::now();
            Ok(existing.clone())
        })
        .await
    }

    async fn validate(&self) -> Result<(), RegistryError> {
        let guard = self.state.read().await;
        guard
            .settings
            .validate()
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        for config in guard.servers.values() {
            config.validate().map_err(RegistryError::Validation)?;
        }
        Ok(())
    }

    async fn settings(&self) -> Result<GlobalSettings, RegistryError> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn update_settings(&self, settings: GlobalSettings) -> Result<(), RegistryError> {
        settings
            .validate()
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        self.mutate(|state| {
            state.settings = settings;
            Ok(())
        })
        .await
    }
}
