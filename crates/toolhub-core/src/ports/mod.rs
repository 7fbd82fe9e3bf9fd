//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No storage, process or HTTP types in any signature
//! - Repository-style traits are CRUD-focused
//! - Transport traits are intent-based (initialize, list, call, close)

pub mod catalog;
pub mod event_emitter;
pub mod mcp_error;
pub mod permission;
pub mod registry;
pub mod transport;

pub use catalog::{CatalogEntry, CatalogError, ServerCatalog};
pub use event_emitter::{McpEventEmitter, NoopEmitter};
pub use mcp_error::{McpErrorCategory, McpErrorInfo, McpServiceError};
pub use permission::{PermissionChecker, PermissionDecision};
pub use registry::{RegistryError, ServerRegistry};
pub use transport::{
    AdvertisedCapabilities, ClientInfo, ConnectTarget, InitializeResult, LaunchSpec,
    McpTransport, TransportError, TransportFactory,
};
