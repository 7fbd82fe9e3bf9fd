//! Core domain types and port definitions for toolhub.
//!
//! This crate has no infrastructure dependencies. Adapters (`toolhub-store`,
//! `toolhub-mcp`, `toolhub-cli`) depend on it, never the other way around.

#![deny(unsafe_code)]

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    CallRequest, CallResult, ConnectionSnapshot, ConnectionState, McpCapabilityFlags,
    McpEnvEntry, McpPrompt, McpPromptArgument, McpPromptMessages, McpResource,
    McpResourceContents, McpServerConfig, McpServerStatus, McpTool, McpToolResult,
    McpTransportKind, OperationKind,
};
pub use events::McpEvent;
pub use paths::{PathError, registry_path, resolve_workspace_root};
pub use ports::{
    AdvertisedCapabilities, CatalogEntry, CatalogError, ClientInfo, ConnectTarget,
    InitializeResult, LaunchSpec, McpErrorCategory, McpErrorInfo, McpEventEmitter,
    McpServiceError, McpTransport, NoopEmitter, PermissionChecker, PermissionDecision,
    RegistryError, ServerCatalog, ServerRegistry, TransportError, TransportFactory,
};
pub use settings::{ControllerSettings, GlobalSettings, SettingsError};
