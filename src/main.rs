mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, MigrationCommands};
use dockyard::{Error as DockyardError, Parser as ConfigParser};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(dockyard_error) = e.downcast_ref::<DockyardError>() {
            eprintln!("Error: {}", dockyard_error);
            if let Some(suggestion) = dockyard_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    // ── Commands that need no config ────────────────────────────────
    if let Commands::Migrations(MigrationCommands::Ls) = &cli.command {
        return commands::run_migrations_ls();
    }

    let config = ConfigParser::new().load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => commands::run_serve(config).await,
        Commands::Clean => commands::run_clean(&config).await,
        Commands::Reset { .. } => commands::run_reset(&config),
        Commands::Migrations(_) => Ok(()),
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
