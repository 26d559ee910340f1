use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "Dockyard - Run a local datastore, REST layer and gateway in Docker")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to $DOCKYARD_CONFIG, then dockyard.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start all services and serve the status endpoint until interrupted
    Serve,
    /// Remove leftover containers and the managed network
    Clean,
    /// Delete all persisted datastore data. This cannot be undone
    Reset {
        /// Confirm deletion of the datastore
        #[arg(long, required = true)]
        confirm: bool,
    },
    /// Inspect embedded migrations
    #[command(subcommand)]
    Migrations(MigrationCommands),
}

#[derive(Subcommand)]
pub enum MigrationCommands {
    /// List embedded migrations in apply order
    Ls,
}
