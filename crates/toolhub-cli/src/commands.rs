//! Subcommands.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// List registered servers with their connection status
    List,

    /// Show one server's status
    Status {
        /// Server name
        name: String,
    },

    /// Register a local server launched as a subprocess
    AddLocal {
        /// Unique server name
        name: String,
        /// Launch command and arguments (quote to keep as one string)
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
        /// Environment override, repeatable (KEY=VALUE)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// Absolute working directory for the process
        #[arg(long)]
        cwd: Option<String>,
        /// Register without starting
        #[arg(long)]
        disabled: bool,
    },

    /// Register a network server
    AddRemote {
        /// Unique server name
        name: String,
        /// Endpoint URL
        url: String,
        /// remote (HTTP with SSE fallback), http, or sse
        #[arg(long, default_value = "remote")]
        transport: String,
        /// Handshake timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Register without starting
        #[arg(long)]
        disabled: bool,
    },

    /// Unregister a server and close its connection
    Remove {
        name: String,
    },

    /// Enable and start a server
    Enable {
        name: String,
    },

    /// Disable and stop a server
    Disable {
        name: String,
    },

    /// Reconnect a server
    Restart {
        name: String,
    },

    /// Connect to a server without registering it and list its tools
    Test {
        /// Launch command for a local server, or a URL for a remote one
        target: String,
    },

    /// Call a tool on a server
    Call {
        server: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Approve operations that need confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List tools of connected servers
    Tools {
        /// Only this server
        server: Option<String>,
    },

    /// List servers available from the workspace catalog
    Discover,

    /// Start enabled servers and keep them healthy until Ctrl-C
    Serve,
}
