//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn <command>(ctx: &CliContext, ...) -> Result<(), CliError>`
//! - Parse CLI-specific input, call the MCP service, format the output.
//!
//! The CLI process is short-lived, so handlers that need a live connection
//! start it themselves and shut the service down before returning.

pub mod call;
pub mod serve;
pub mod servers;
