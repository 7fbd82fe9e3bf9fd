//! Catalog port for discovering installable tool servers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::mcp::McpServerConfig;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid catalog entry: {0}")]
    InvalidEntry(String),
}

/// One discoverable server with a ready-to-register template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template: McpServerConfig,
}

/// Source of server templates (a bundled list, a remote index, ...).
#[async_trait]
pub trait ServerCatalog: Send + Sync {
    async fn discover(&self) -> Result<Vec<CatalogEntry>, CatalogError>;
}
