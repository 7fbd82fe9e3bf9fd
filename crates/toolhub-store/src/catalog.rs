//! File-backed [`ServerCatalog`].
//!
//! The catalog is a JSON array of entries, each carrying a server template
//! ready to pass to `add_server`. A missing file is an empty catalog.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use toolhub_core::{CatalogEntry, CatalogError, ServerCatalog};

/// Catalog file name next to the registry document.
pub const CATALOG_FILE_NAME: &str = "catalog.json";

pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ServerCatalog for JsonFileCatalog {
    async fn discover(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No catalog file");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(CatalogError::Unavailable(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };

        let entries: Vec<CatalogEntry> = serde_json::from_str(&contents)
            .map_err(|e| CatalogError::Unavailable(format!("{}: {e}", self.path.display())))?;
        for entry in &entries {
            entry
                .template
                .validate()
                .map_err(|reason| CatalogError::InvalidEntry(format!("{}: {reason}", entry.name)))?;
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonFileCatalog::new(dir.path().join(CATALOG_FILE_NAME));
        assert!(catalog.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_are_returned_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE_NAME);
        std::fs::write(
            &path,
            r#"[
                {"name": "filesystem", "description": "Local files",
                 "template": {"name": "fs", "transport": "local", "command": ["mcp-fs"]}},
                {"name": "search",
                 "template": {"name": "search", "transport": "http", "url": "https://search.example.com/mcp"}}
            ]"#,
        )
        .unwrap();

        let entries = JsonFileCatalog::new(&path).discover().await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["filesystem", "search"]);
        assert_eq!(entries[0].template.command, ["mcp-fs"]);
        assert!(entries[1].description.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_template_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE_NAME);
        std::fs::write(
            &path,
            r#"[{"name": "broken", "template": {"name": "broken", "transport": "sse"}}]"#,
        )
        .unwrap();

        let err = JsonFileCatalog::new(&path).discover().await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidEntry(_)));
    }
}
