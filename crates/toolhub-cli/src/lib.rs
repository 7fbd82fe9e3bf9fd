//! toolhub command-line front end.
//!
//! `main.rs` parses arguments, calls [`bootstrap`] and hands the resulting
//! [`CliContext`] to a handler.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod policy;
pub mod presentation;

// Re-export primary types for convenient access
pub use bootstrap::{CliConfig, CliContext, LogEmitter, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
