//! CLI entry point - the composition root.
//!
//! Command dispatch routes to handlers, which talk only to the MCP service
//! built by [`bootstrap`].

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use toolhub_cli::handlers::{call, serve, servers};
use toolhub_cli::{Cli, CliConfig, CliError, Commands, bootstrap};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads TOOLHUB_WORKSPACE
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::resolve(cli.workspace.as_deref())?;
    let ctx = bootstrap(config).await?;

    match command {
        Commands::List => servers::list(&ctx).await?,
        Commands::Status { name } => servers::status(&ctx, &name).await?,
        Commands::AddLocal {
            name,
            command,
            env,
            cwd,
            disabled,
        } => {
            let args = servers::AddLocalArgs {
                name,
                command,
                env,
                cwd,
                disabled,
            };
            servers::add_local(&ctx, args).await?;
        }
        Commands::AddRemote {
            name,
            url,
            transport,
            timeout,
            disabled,
        } => servers::add_remote(&ctx, name, url, &transport, timeout, disabled).await?,
        Commands::Remove { name } => servers::remove(&ctx, &name).await?,
        Commands::Enable { name } => servers::enable(&ctx, &name).await?,
        Commands::Disable { name } => servers::disable(&ctx, &name).await?,
        Commands::Restart { name } => servers::restart(&ctx, &name).await?,
        Commands::Test { target } => servers::test(&ctx, &target).await?,
        Commands::Call {
            server,
            tool,
            args,
            yes,
        } => call::call(&ctx, &server, &tool, &args, yes).await?,
        Commands::Tools { server } => call::tools(&ctx, server.as_deref()).await?,
        Commands::Discover => call::discover(&ctx).await?,
        Commands::Serve => serve::serve(&ctx).await?,
    }
    Ok(())
}
