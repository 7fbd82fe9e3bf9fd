//! Long-running mode: keep enabled servers connected until Ctrl-C.

use tracing::info;

use crate::bootstrap::CliContext;
use crate::error::CliError;

pub async fn serve(ctx: &CliContext) -> Result<(), CliError> {
    let report = ctx.mcp().initialize().await?;
    let started = report.iter().filter(|(_, r)| r.is_ok()).count();
    println!("Started {started}/{} enabled server(s).", report.len());
    for (name, result) in &report {
        if let Err(e) = result {
            println!("  {name}: {e}");
        }
    }
    println!("Health checks running. Press Ctrl-C to stop.");

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutting down MCP servers");
    ctx.mcp().shutdown().await;
    signal.map_err(|e| CliError::Service(format!("Failed to listen for Ctrl-C: {e}")))
}
