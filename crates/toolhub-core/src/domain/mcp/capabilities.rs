//! Capabilities advertised by a tool server and the results of invoking them.

use serde::{Deserialize, Serialize};

/// Tool definition from an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool name (function name).
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl McpTool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Names listed under `required` in the input schema.
    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_schema
            .as_ref()
            .and_then(|schema| schema.get("required"))
            .and_then(serde_json::Value::as_array)
            .map(|required| required.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Readable resource advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpResource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl McpResource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }
}

/// Argument accepted by a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpPromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Parameterized prompt advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpPrompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<McpPromptArgument>,
}

impl McpPrompt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, required: bool) -> Self {
        self.arguments.push(McpPromptArgument {
            name: name.into(),
            description: None,
            required,
        });
        self
    }

    /// Names of arguments marked as required.
    pub fn required_arguments(&self) -> impl Iterator<Item = &str> {
        self.arguments
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Result data (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl McpToolResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Contents returned by `resources/read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResourceContents {
    pub uri: String,
    /// Raw content items (text or blob entries) as returned by the server.
    pub contents: Vec<serde_json::Value>,
}

/// Messages returned by `prompts/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpPromptMessages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_arguments_from_schema() {
        let tool = McpTool::new("read_file").with_input_schema(json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "encoding": {"type": "string"}},
            "required": ["path"]
        }));
        assert_eq!(tool.required_arguments(), vec!["path"]);

        assert!(McpTool::new("ping").required_arguments().is_empty());
    }

    #[test]
    fn test_prompt_required_arguments() {
        let prompt = McpPrompt::new("review")
            .with_argument("diff", true)
            .with_argument("tone", false);
        assert_eq!(prompt.required_arguments().collect::<Vec<_>>(), vec!["diff"]);
    }

    #[test]
    fn test_tool_result() {
        let success = McpToolResult::success(json!({"temp": 72}));
        assert!(success.success);
        assert!(success.data.is_some());

        let error = McpToolResult::error("Connection failed");
        assert!(!error.success);
        assert_eq!(error.error, Some("Connection failed".to_string()));
    }

    #[test]
    fn test_resource_mime_type_wire_name() {
        let resource: McpResource = serde_json::from_value(json!({
            "uri": "file:///notes.md",
            "name": "notes",
            "mimeType": "text/markdown"
        }))
        .unwrap();
        assert_eq!(resource.mime_type.as_deref(), Some("text/markdown"));
    }
}
