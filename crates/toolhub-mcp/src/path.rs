//! Launch-path checks for local tool servers.
//!
//! This module provides utilities to:
//! - Validate an explicit program path (exists, is a file, executable)
//! - Build the effective PATH for child processes
//! - Validate working directories

use std::env;
use std::ffi::OsString;
use std::path::Path;

/// Platform-specific PATH separator
#[cfg(unix)]
const PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";

/// Default paths to include on macOS when PATH is limited (bundled apps)
#[cfg(target_os = "macos")]
const MACOS_DEFAULT_PATHS: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Validate the program a local server launches.
///
/// Bare names (`npx`, `uvx`) are left to PATH lookup at spawn time. Anything
/// containing a separator must point at an existing executable file.
pub fn validate_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("Program cannot be empty".to_string());
    }

    let path = Path::new(program);
    if path.components().count() <= 1 && !path.is_absolute() {
        return Ok(());
    }

    if !path.exists() {
        return Err(format!("Executable not found: {program}"));
    }

    if !path.is_file() {
        return Err(format!("Executable path is not a file: {program}"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(metadata) => {
                if metadata.permissions().mode() & 0o111 == 0 {
                    return Err(format!("File is not executable: {program}"));
                }
            }
            Err(e) => return Err(format!("Failed to check permissions: {e}")),
        }
    }

    Ok(())
}

/// Validate a working directory.
///
/// Returns Ok(()) if the directory exists and is actually a directory.
pub fn validate_working_dir(cwd: &str) -> Result<(), String> {
    let path = Path::new(cwd);

    if !path.exists() {
        return Err(format!("Working directory does not exist: {cwd}"));
    }

    if !path.is_dir() {
        return Err(format!("Working directory path is not a directory: {cwd}"));
    }

    Ok(())
}

/// Build an effective PATH for the child process.
///
/// This includes:
/// 1. Directory containing the program, when it is given as a path
/// 2. Current process PATH
/// 3. Platform-specific default paths (macOS: Homebrew, etc.)
/// 4. Optional extra entries (a `PATH` override from the server's env)
///
/// Entries are deduplicated.
pub fn build_effective_path(program: &str, path_extra: Option<&str>) -> OsString {
    let mut path_entries = Vec::new();

    if let Some(dir_str) = Path::new(program)
        .parent()
        .and_then(Path::to_str)
        .filter(|d| !d.is_empty())
    {
        path_entries.push(dir_str.to_string());
    }

    if let Some(current_path) = env::var_os("PATH") {
        if let Some(current_path_str) = current_path.to_str() {
            path_entries.extend(
                current_path_str
                    .split(PATH_SEPARATOR)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string),
            );
        }
    }

    #[cfg(target_os = "macos")]
    {
        path_entries.extend(
            MACOS_DEFAULT_PATHS
                .split(':')
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        );
    }

    if let Some(extra) = path_extra {
        path_entries.extend(
            extra
                .split(PATH_SEPARATOR)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        );
    }

    // Deduplicate while preserving order
    let mut seen = std::collections::HashSet::new();
    let deduped: Vec<String> = path_entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    OsString::from(deduped.join(PATH_SEPARATOR))
}
