//! Registry management: list, status, add, remove, enable, disable,
//! restart, test.

use toolhub_core::{McpServerConfig, McpServerStatus, McpServiceError, McpTransportKind};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{format_last_seen, print_separator, truncate_string};

pub async fn list(ctx: &CliContext) -> Result<(), CliError> {
    let statuses = ctx.mcp().list_server_statuses().await?;
    if statuses.is_empty() {
        println!("No MCP servers registered.");
        println!("Use 'toolhub add-local' or 'toolhub add-remote' to add one.");
        return Ok(());
    }

    println!(
        "{:<20} {:<8} {:<8} {:<13} {:<6} {:<6} {:<8} Description",
        "Name", "Type", "Enabled", "State", "Tools", "Res", "Prompts"
    );
    print_separator(100);
    for status in &statuses {
        print_row(status);
    }
    Ok(())
}

fn print_row(status: &McpServerStatus) {
    println!(
        "{:<20} {:<8} {:<8} {:<13} {:<6} {:<6} {:<8} {}",
        truncate_string(&status.name, 19),
        status.transport,
        if status.enabled { "yes" } else { "no" },
        status.state,
        status.tool_count,
        status.resource_count,
        status.prompt_count,
        truncate_string(&status.description, 30),
    );
}

pub async fn status(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    let status = ctx.mcp().get_server_status(name).await?;
    println!("Name:        {}", status.name);
    println!("Transport:   {}", status.transport);
    println!("Enabled:     {}", status.enabled);
    println!("State:       {}", status.state);
    println!("Last seen:   {}", format_last_seen(status.last_seen));
    println!(
        "Discovered:  {} tools, {} resources, {} prompts",
        status.tool_count, status.resource_count, status.prompt_count
    );
    if !status.description.is_empty() {
        println!("Description: {}", status.description);
    }
    Ok(())
}

/// Split `KEY=VALUE` pairs.
pub fn parse_env_pairs(pairs: &[String]) -> Result<Vec<(String, String)>, CliError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .ok_or_else(|| {
                    CliError::Arguments(format!("Expected KEY=VALUE for --env, got '{pair}'"))
                })
        })
        .collect()
}

pub struct AddLocalArgs {
    pub name: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub cwd: Option<String>,
    pub disabled: bool,
}

pub async fn add_local(ctx: &CliContext, args: AddLocalArgs) -> Result<(), CliError> {
    let mut config = McpServerConfig::local(args.name, args.command);
    for (key, value) in parse_env_pairs(&args.env)? {
        config = config.with_env(key, value);
    }
    if let Some(cwd) = args.cwd {
        config = config.with_working_dir(cwd);
    }
    config.enabled = !args.disabled;
    add(ctx, config).await
}

pub async fn add_remote(
    ctx: &CliContext,
    name: String,
    url: String,
    transport: &str,
    timeout: Option<u64>,
    disabled: bool,
) -> Result<(), CliError> {
    let kind: McpTransportKind = transport.parse().map_err(CliError::Arguments)?;
    if kind.is_local() {
        return Err(CliError::Arguments(
            "Use 'toolhub add-local' for local servers".to_string(),
        ));
    }
    let mut config = McpServerConfig::network(name, kind, url);
    config.timeout_secs = timeout;
    config.enabled = !disabled;
    add(ctx, config).await
}

async fn add(ctx: &CliContext, config: McpServerConfig) -> Result<(), CliError> {
    let name = config.name.clone();
    let result = ctx.mcp().add_server(config).await;
    let status = ctx.mcp().get_server_status(&name).await;
    ctx.mcp().shutdown().await;

    match result {
        Ok(saved) if saved.enabled => {
            println!("Added '{name}' ({} tools discovered).", status?.tool_count);
            Ok(())
        }
        Ok(_) => {
            println!("Added '{name}' (disabled).");
            Ok(())
        }
        // Registered, but the first connection failed.
        Err(e @ (McpServiceError::Transport { .. } | McpServiceError::Timeout { .. })) => {
            println!("Added '{name}', but it could not be started: {e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn remove(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    ctx.mcp().remove_server(name).await?;
    println!("Removed '{name}'.");
    Ok(())
}

pub async fn enable(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    let result = ctx.mcp().enable_server(name).await;
    ctx.mcp().shutdown().await;
    let snapshot = result?;
    println!(
        "Enabled '{name}' ({} tools discovered).",
        snapshot.tools.len()
    );
    Ok(())
}

pub async fn disable(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    ctx.mcp().disable_server(name).await?;
    println!("Disabled '{name}'.");
    Ok(())
}

pub async fn restart(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    let result = ctx.mcp().restart_server(name).await;
    ctx.mcp().shutdown().await;
    let snapshot = result?;
    println!(
        "Restarted '{name}': {} tools, {} resources, {} prompts.",
        snapshot.tools.len(),
        snapshot.resources.len(),
        snapshot.prompts.len()
    );
    Ok(())
}

/// Probe config built from a bare command line or URL.
pub fn probe_config(target: &str) -> McpServerConfig {
    if target.starts_with("http://") || target.starts_with("https://") {
        McpServerConfig::network("probe", McpTransportKind::Remote, target)
    } else {
        McpServerConfig::local("probe", vec![target.to_string()])
    }
}

pub async fn test(ctx: &CliContext, target: &str) -> Result<(), CliError> {
    let tools = ctx.mcp().test_connection(&probe_config(target)).await?;
    println!("Connected. {} tool(s):", tools.len());
    for tool in tools {
        println!(
            "  {:<30} {}",
            tool.name,
            tool.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
