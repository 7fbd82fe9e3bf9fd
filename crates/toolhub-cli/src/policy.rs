//! Path policy applied before proxied operations.
//!
//! Each server's `allowed_paths` / `denied_paths` lists govern the paths its
//! operations may touch: the resource URI for reads, and any `path`-like
//! argument for tool calls. Tool calls need confirmation unless the server
//! restricts itself with an allow-list.

use std::collections::HashMap;

use serde_json::Value;
use toolhub_core::{McpServerConfig, OperationKind, PermissionChecker, PermissionDecision};

/// Argument names treated as filesystem paths.
const PATH_ARGUMENTS: &[&str] = &["path", "file", "directory", "source", "destination"];

pub struct PathPolicy {
    servers: HashMap<String, McpServerConfig>,
}

impl PathPolicy {
    pub fn new(configs: Vec<McpServerConfig>) -> Self {
        Self {
            servers: configs.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    fn check_paths<'a>(
        config: &McpServerConfig,
        paths: impl Iterator<Item = &'a str>,
    ) -> Option<PermissionDecision> {
        paths
            .filter(|path| !config.permits_path(path))
            .map(|path| {
                PermissionDecision::deny(format!(
                    "'{path}' is outside the paths allowed for '{}'",
                    config.name
                ))
            })
            .next()
    }
}

fn path_arguments(arguments: &HashMap<String, Value>) -> impl Iterator<Item = &str> {
    arguments
        .iter()
        .filter(|(key, _)| PATH_ARGUMENTS.contains(&key.as_str()))
        .filter_map(|(_, value)| value.as_str())
}

/// Filesystem path of a `file://` URI; other schemes have none.
fn uri_path(uri: &str) -> Option<&str> {
    uri.strip_prefix("file://")
}

impl PermissionChecker for PathPolicy {
    fn check_permission(
        &self,
        _session_id: &str,
        kind: OperationKind,
        server: &str,
        target: &str,
        arguments: &HashMap<String, Value>,
    ) -> PermissionDecision {
        if kind == OperationKind::Prompt {
            return PermissionDecision::allow();
        }
        let Some(config) = self.servers.get(server) else {
            return PermissionDecision::deny(format!("Unknown server '{server}'"));
        };

        if kind == OperationKind::Resource {
            return uri_path(target)
                .and_then(|path| Self::check_paths(config, std::iter::once(path)))
                .unwrap_or_else(PermissionDecision::allow);
        }

        if let Some(denied) = Self::check_paths(config, path_arguments(arguments)) {
            return denied;
        }
        if config.allowed_paths.is_empty() {
            PermissionDecision::needs_approval(format!("'{server}' has no path allow-list"))
        } else {
            PermissionDecision::allow()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> PathPolicy {
        let mut fs = McpServerConfig::local("fs", vec!["mcp-fs".to_string()]);
        fs.allowed_paths = vec!["/work".to_string()];
        fs.denied_paths = vec!["/work/secrets".to_string()];
        let open = McpServerConfig::local("open", vec!["mcp-open".to_string()]);
        PathPolicy::new(vec![fs, open])
    }

    fn args(path: &str) -> HashMap<String, Value> {
        HashMap::from([("path".to_string(), json!(path))])
    }

    #[test]
    fn test_tool_inside_allow_list_is_allowed() {
        let decision =
            policy().check_permission("s", OperationKind::Tool, "fs", "fs", &args("/work/a.txt"));
        assert_eq!(decision, PermissionDecision::allow());
    }

    #[test]
    fn test_denied_path_wins_over_allow() {
        let decision = policy().check_permission(
            "s",
            OperationKind::Tool,
            "fs",
            "fs",
            &args("/work/secrets/key"),
        );
        assert!(!decision.allowed);
    }

    #[test]
    fn test_server_without_allow_list_needs_approval() {
        let decision =
            policy().check_permission("s", OperationKind::Tool, "open", "open", &HashMap::new());
        assert!(decision.allowed);
        assert!(decision.requires_approval);
    }

    #[test]
    fn test_unknown_server_is_denied() {
        let decision =
            policy().check_permission("s", OperationKind::Tool, "ghost", "ghost", &HashMap::new());
        assert!(!decision.allowed);
    }

    #[test]
    fn test_resource_uri_checked_against_its_own_server() {
        let policy = policy();
        let read = |server: &str, uri: &str| {
            policy.check_permission("s", OperationKind::Resource, server, uri, &HashMap::new())
        };

        assert!(!read("fs", "file:///work/secrets/key").allowed);
        assert!(!read("fs", "file:///etc/hosts").allowed);
        assert!(read("fs", "file:///work/notes.md").allowed);
        assert!(read("fs", "https://example.com/doc").allowed);

        // Another server's allow-list does not apply
        assert!(read("open", "file:///etc/hosts").allowed);
        assert!(!read("ghost", "file:///etc/hosts").allowed);
    }

    #[test]
    fn test_parent_components_cannot_escape_allow_list() {
        let policy = policy();
        for path in ["/work/../etc/passwd", "/work/x/../secrets/key", "work/a.txt"] {
            let decision =
                policy.check_permission("s", OperationKind::Tool, "fs", "fs", &args(path));
            assert!(!decision.allowed, "{path} should be denied");
        }
        let uri = policy.check_permission(
            "s",
            OperationKind::Resource,
            "fs",
            "file:///work/../etc/passwd",
            &HashMap::new(),
        );
        assert!(!uri.allowed);
    }

    #[test]
    fn test_prompts_are_allowed() {
        let decision = policy().check_permission(
            "s",
            OperationKind::Prompt,
            "ghost",
            "ghost",
            &HashMap::new(),
        );
        assert_eq!(decision, PermissionDecision::allow());
    }
}
