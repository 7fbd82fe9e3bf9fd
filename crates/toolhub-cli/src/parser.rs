//! Main CLI parser and top-level argument handling.

use clap::Parser;

use crate::commands::Commands;

/// Manage MCP tool servers for a workspace.
#[derive(Parser)]
#[command(name = "toolhub")]
#[command(about = "Manage MCP tool servers for a workspace")]
#[command(version)]
pub struct Cli {
    /// Workspace root holding `.toolhub/mcp-servers.json`
    #[arg(long, global = true, env = "TOOLHUB_WORKSPACE")]
    pub workspace: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
