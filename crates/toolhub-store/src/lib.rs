//! JSON file registry for toolhub.
//!
//! Persists the server table and global settings as one document at
//! `<workspace>/.toolhub/mcp-servers.json`. Environment values are stored
//! base64-encoded (not encryption, only keeps secrets out of casual view).
//! A sibling `catalog.json` backs server discovery.

#![deny(unsafe_code)]

mod catalog;
mod document;
mod json_registry;

pub use catalog::{CATALOG_FILE_NAME, JsonFileCatalog};
pub use json_registry::JsonFileRegistry;
