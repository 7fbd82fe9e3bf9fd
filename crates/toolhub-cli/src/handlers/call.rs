//! Tool calls, tool listing and catalog discovery.

use std::collections::HashMap;

use serde_json::Value;
use toolhub_mcp::Approval;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{print_separator, truncate_string};

/// Session id recorded for permission checks made from the terminal.
const CLI_SESSION: &str = "cli";

/// Parse `--args` into an argument map. It must be a JSON object.
pub fn parse_arguments(raw: &str) -> Result<HashMap<String, Value>, CliError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(CliError::Arguments(
            "--args must be a JSON object".to_string(),
        )),
        Err(e) => Err(CliError::Arguments(format!("--args is not valid JSON: {e}"))),
    }
}

pub async fn call(
    ctx: &CliContext,
    server: &str,
    tool: &str,
    raw_args: &str,
    approve: bool,
) -> Result<(), CliError> {
    let arguments = parse_arguments(raw_args)?;
    let gate = ctx
        .gate()
        .await
        .map_err(|e| CliError::Config(e.to_string()))?;
    let approval = if approve {
        Approval::Granted
    } else {
        Approval::NotGranted
    };

    let result = async {
        ctx.mcp().restart_server(server).await?;
        gate.call_tool(CLI_SESSION, server, tool, arguments, approval)
            .await
    }
    .await;
    ctx.mcp().shutdown().await;

    let result = result?;
    if result.success {
        let data = result.data.unwrap_or(Value::Null);
        let pretty = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
        println!("{pretty}");
        Ok(())
    } else {
        Err(CliError::Service(format!(
            "Tool '{tool}' failed: {}",
            result.error.unwrap_or_default()
        )))
    }
}

/// Start enabled servers and print what they expose.
pub async fn tools(ctx: &CliContext, only: Option<&str>) -> Result<(), CliError> {
    let listing = async {
        match only {
            Some(name) => {
                ctx.mcp().restart_server(name).await?;
                let tools = ctx.mcp().list_server_tools(name).await?;
                Ok(vec![(name.to_string(), tools)])
            }
            None => {
                for (name, result) in ctx.mcp().initialize().await? {
                    if let Err(e) = result {
                        eprintln!("{name}: {e}");
                    }
                }
                Ok::<_, toolhub_core::McpServiceError>(ctx.mcp().list_all_tools().await)
            }
        }
    }
    .await;
    ctx.mcp().shutdown().await;

    let listing = listing?;
    if listing.iter().all(|(_, tools)| tools.is_empty()) {
        println!("No tools available.");
        return Ok(());
    }
    println!("{:<20} {:<30} Description", "Server", "Tool");
    print_separator(90);
    for (server, tools) in listing {
        for tool in tools {
            println!(
                "{:<20} {:<30} {}",
                truncate_string(&server, 19),
                truncate_string(&tool.name, 29),
                truncate_string(tool.description.as_deref().unwrap_or(""), 40)
            );
        }
    }
    Ok(())
}

pub async fn discover(ctx: &CliContext) -> Result<(), CliError> {
    let entries = ctx.mcp().discover_servers().await?;
    if entries.is_empty() {
        println!(
            "No catalog entries. Add templates to {}.",
            ctx.config.catalog_path().display()
        );
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<20} {:<8} {}",
            truncate_string(&entry.name, 19),
            entry.template.transport,
            entry.description
        );
    }
    Ok(())
}
