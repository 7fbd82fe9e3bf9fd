//! On-disk document layout and env value encoding.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use toolhub_core::settings::GlobalSettings;
use toolhub_core::{McpServerConfig, RegistryError};

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

/// The persisted registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

const fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl RegistryDocument {
    /// Build a document for writing, encoding env values.
    pub fn encode(settings: &GlobalSettings, servers: &BTreeMap<String, McpServerConfig>) -> Self {
        let servers = servers
            .iter()
            .map(|(name, config)| {
                let mut stored = config.clone();
                for entry in &mut stored.env {
                    entry.value = encode_env_value(&entry.value);
                }
                (name.clone(), stored)
            })
            .collect();

        Self {
            version: DOCUMENT_VERSION,
            settings: settings.clone(),
            servers,
        }
    }

    /// Decode env values in place and check keys match names.
    pub fn decode(mut self) -> Result<Self, RegistryError> {
        if self.version > DOCUMENT_VERSION {
            return Err(RegistryError::Serialization(format!(
                "Unsupported registry version {} (expected <= {DOCUMENT_VERSION})",
                self.version
            )));
        }

        for (key, config) in &mut self.servers {
            if config.name != *key {
                return Err(RegistryError::Serialization(format!(
                    "Server entry '{key}' has mismatched name '{}'",
                    config.name
                )));
            }
            for entry in &mut config.env {
                entry.value = decode_env_value(&entry.value)?;
            }
        }
        Ok(self)
    }
}

/// Decode a base64-encoded environment variable value.
fn decode_env_value(encoded: &str) -> Result<String, RegistryError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RegistryError::Serialization(format!("Failed to decode env var: {e}")))?;

    String::from_utf8(bytes)
        .map_err(|e| RegistryError::Serialization(format!("Invalid UTF-8 in env var: {e}")))
}

/// Encode an environment variable value to base64.
fn encode_env_value(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}
