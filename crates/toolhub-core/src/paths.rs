//! Registry location resolution.
//!
//! The registry lives under the workspace root:
//! `<workspace>/.toolhub/mcp-servers.json`.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directory under the workspace root holding toolhub state.
pub const CONFIG_DIR_NAME: &str = ".toolhub";

/// Registry document file name.
pub const REGISTRY_FILE_NAME: &str = "mcp-servers.json";

/// Environment variable overriding the workspace root.
pub const WORKSPACE_ENV_VAR: &str = "TOOLHUB_WORKSPACE";

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// An empty path was provided.
    #[error("Path cannot be empty")]
    EmptyPath,

    /// A path was expected to be a directory but was not.
    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    /// Failed to get the current working directory.
    #[error("Cannot determine current directory: {0}")]
    CurrentDirError(String),
}

/// Path of the registry document for a workspace root.
pub fn registry_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(CONFIG_DIR_NAME).join(REGISTRY_FILE_NAME)
}

/// Resolve the workspace root.
///
/// Resolution order:
/// 1. Explicit path provided by caller (highest priority)
/// 2. `TOOLHUB_WORKSPACE` environment variable
/// 3. Current working directory
pub fn resolve_workspace_root(explicit: Option<&str>) -> Result<PathBuf, PathError> {
    if let Some(path) = explicit {
        return checked_dir(path);
    }

    if let Ok(env_path) = env::var(WORKSPACE_ENV_VAR)
        && !env_path.trim().is_empty()
    {
        return checked_dir(&env_path);
    }

    env::current_dir().map_err(|e| PathError::CurrentDirError(e.to_string()))
}

fn checked_dir(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }
    let path = PathBuf::from(trimmed);
    if path.exists() && !path.is_dir() {
        return Err(PathError::NotADirectory(path));
    }
    Ok(path)
}
