//! Desired-state configuration of a tool server.
//!
//! These types are persisted verbatim in the registry document.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::runtime::OperationKind;

/// Type of MCP server connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    /// Local subprocess speaking JSON-RPC over stdin/stdout.
    #[default]
    Local,
    /// Remote endpoint; streamable HTTP with a legacy SSE fallback.
    Remote,
    /// Legacy server-push endpoint (GET event stream + POST endpoint).
    Sse,
    /// Streamable HTTP endpoint.
    Http,
}

impl McpTransportKind {
    /// Whether this kind spawns a local process.
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }

    /// Lowercase wire/display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Sse => "sse",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for McpTransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "stdio" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "sse" => Ok(Self::Sse),
            "http" | "streamable-http" | "streamable_http" => Ok(Self::Http),
            other => Err(format!("Unsupported MCP transport: {other}")),
        }
    }
}

/// Environment variable override for local servers.
///
/// Note: Values are stored base64-encoded in the registry file.
/// This is encoding, NOT encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpEnvEntry {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl McpEnvEntry {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Which capability families are used for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpCapabilityFlags {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
}

impl Default for McpCapabilityFlags {
    fn default() -> Self {
        Self {
            tools: true,
            resources: true,
            prompts: true,
        }
    }
}

impl McpCapabilityFlags {
    /// Whether operations of the given kind are enabled.
    pub const fn allows(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Tool => self.tools,
            OperationKind::Resource => self.resources,
            OperationKind::Prompt => self.prompts,
        }
    }
}

const fn default_enabled() -> bool {
    true
}

/// Desired configuration for one tool server.
///
/// For local servers `command` is required. For remote, SSE and HTTP servers
/// `url` is required. `name` is the unique registry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique name of the server.
    pub name: String,

    /// Connection type.
    pub transport: McpTransportKind,

    /// Free-form description shown in status listings.
    #[serde(default)]
    pub description: String,

    /// Whether the server should be running.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    // --- Local server fields ---
    /// Launch command as an argv vector. Each element is shell-tokenized at
    /// launch, so `["npx -y @scope/server"]` and `["npx", "-y", "@scope/server"]`
    /// are equivalent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Extra arguments appended after `command`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment overrides for the child process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<McpEnvEntry>,

    /// Working directory for the process (must be absolute if specified).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    // --- Network server fields ---
    /// Endpoint URL (e.g., `http://localhost:3001/mcp`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Handshake/connection timeout; the global default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Retry count reported to front ends.
    #[serde(default)]
    pub retries: u32,

    /// Capability families to discover and allow calls for.
    #[serde(default)]
    pub capabilities: McpCapabilityFlags,

    /// Path prefixes this server may touch. Empty allows everything not denied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_paths: Vec<String>,

    /// Path prefixes this server must not touch. Takes precedence over allows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied_paths: Vec<String>,

    /// When the server was added.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// When the configuration last changed.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl McpServerConfig {
    fn base(name: impl Into<String>, transport: McpTransportKind) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            transport,
            description: String::new(),
            enabled: true,
            command: Vec::new(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            url: None,
            timeout_secs: None,
            retries: 0,
            capabilities: McpCapabilityFlags::default(),
            allowed_paths: Vec::new(),
            denied_paths: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a local (subprocess) server configuration.
    #[must_use]
    pub fn local(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            command,
            ..Self::base(name, McpTransportKind::Local)
        }
    }

    /// Create a network server configuration of the given kind.
    #[must_use]
    pub fn network(
        name: impl Into<String>,
        transport: McpTransportKind,
        url: impl Into<String>,
    ) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::base(name, transport)
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(McpEnvEntry::new(key, value));
        self
    }

    /// Append launch arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set enabled status.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the capability flags.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: McpCapabilityFlags) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Validate configuration based on transport kind.
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;

        if self.transport.is_local() {
            let Some(program) = self.command.first() else {
                return Err(format!("Local server '{}' requires a command", self.name));
            };
            if program.trim().is_empty() {
                return Err(format!("Local server '{}' command cannot be empty", self.name));
            }

            if let Some(ref cwd) = self.working_dir {
                if !cwd.is_empty() && !Path::new(cwd).is_absolute() {
                    return Err(format!(
                        "Local server '{}' working_dir must be absolute: {cwd}",
                        self.name
                    ));
                }
            }
        } else {
            let url = self
                .url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    format!("{} server '{}' requires a url", self.transport, self.name)
                })?;

            let parsed = url::Url::parse(url)
                .map_err(|e| format!("Server '{}' has an invalid url '{url}': {e}", self.name))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!(
                    "Server '{}' url must use http or https, got '{}'",
                    self.name,
                    parsed.scheme()
                ));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(format!("Server '{}' timeout must be positive", self.name));
        }

        if self
            .allowed_paths
            .iter()
            .chain(&self.denied_paths)
            .any(|p| p.trim().is_empty())
        {
            return Err(format!(
                "Server '{}' path allow/deny entries cannot be empty",
                self.name
            ));
        }

        Ok(())
    }

    /// Whether `path` is permitted by this server's allow/deny lists.
    ///
    /// Matching is by path components, so `/data` covers `/data/x` but not
    /// `/database`. Paths are normalised lexically first; once either list
    /// is set, relative paths and paths that climb above `/` are refused.
    pub fn permits_path(&self, path: &str) -> bool {
        if self.allowed_paths.is_empty() && self.denied_paths.is_empty() {
            return true;
        }
        let Some(candidate) = normalize_absolute(path) else {
            return false;
        };

        let covers = |entry: &String| {
            normalize_absolute(entry).is_some_and(|prefix| candidate.starts_with(prefix))
        };
        if self.denied_paths.iter().any(covers) {
            return false;
        }

        self.allowed_paths.is_empty() || self.allowed_paths.iter().any(covers)
    }
}

/// Resolve `.` and `..` in an absolute path without touching the filesystem.
///
/// Returns `None` for relative paths and for `..` that would climb above the
/// root.
fn normalize_absolute(path: &str) -> Option<PathBuf> {
    let path = Path::new(path.trim());
    if !path.is_absolute() {
        return None;
    }

    let mut normalized = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1)?;
                normalized.pop();
            }
            Component::Normal(part) => {
                depth += 1;
                normalized.push(part);
            }
        }
    }
    Some(normalized)
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Server name cannot be empty".to_string());
    }
    if name.contains(char::is_whitespace) || name.contains(['/', '\\']) {
        return Err(format!(
            "Server name '{name}' must not contain whitespace or path separators"
        ));
    }
    Ok(())
}
