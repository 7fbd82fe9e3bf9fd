//! Server registry trait and error types.
//!
//! This module defines the persistence abstraction for desired server state.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::mcp::McpServerConfig;
use crate::settings::GlobalSettings;

/// Domain-specific errors for registry operations.
///
/// This error type abstracts away storage implementation details and provides
/// a clean interface for services to handle registry failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested server was not found.
    #[error("MCP server not found: {0}")]
    NotFound(String),

    /// A server with the same name already exists.
    #[error("MCP server already exists: {0}")]
    AlreadyExists(String),

    /// A configuration failed validation.
    #[error("Invalid MCP configuration: {0}")]
    Validation(String),

    /// Storage backend error (filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// The stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persisted table of desired server configurations.
///
/// # Design Rules
///
/// - `name` is the unique key
/// - Mutations persist before returning
/// - Toggling `enabled` never starts or stops anything; that is the
///   service's job
/// - Implementations keep their own lock and never call into the controller
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// Replace the in-memory table with the persisted document.
    ///
    /// A missing document loads as empty.
    async fn load(&self) -> Result<(), RegistryError>;

    /// Persist the full table atomically.
    async fn save(&self) -> Result<(), RegistryError>;

    /// Insert a new server.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the name is taken
    /// - `Validation` if the config is invalid
    async fn add(&self, config: McpServerConfig) -> Result<McpServerConfig, RegistryError>;

    /// Get a server by name.
    async fn get(&self, name: &str) -> Result<McpServerConfig, RegistryError>;

    /// List all servers ordered by name.
    async fn list(&self) -> Result<Vec<McpServerConfig>, RegistryError>;

    /// Replace an existing server's configuration.
    ///
    /// `created_at` is preserved and `updated_at` is bumped.
    async fn update(&self, config: McpServerConfig) -> Result<McpServerConfig, RegistryError>;

    /// Remove a server and return its last configuration.
    async fn remove(&self, name: &str) -> Result<McpServerConfig, RegistryError>;

    /// Toggle the enabled flag and bump `updated_at`.
    async fn set_enabled(&self, name: &str, enabled: bool)
    -> Result<McpServerConfig, RegistryError>;

    /// Validate every entry.
    async fn validate(&self) -> Result<(), RegistryError>;

    /// Global settings record.
    async fn settings(&self) -> Result<GlobalSettings, RegistryError>;

    /// Replace the global settings record.
    async fn update_settings(&self, settings: GlobalSettings) -> Result<(), RegistryError>;
}
