mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{
    index::IndexCommands, inspect::InspectCommands, invoice::InvoiceCommands,
    migrate::MigrateCommands,
};

#[derive(Parser)]
#[command(author, version, about = "marketfs data store CLI")]
struct Cli {
    /// Path to the configuration file. Defaults to ./.marketfs/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the legacy flat-file layout with the hierarchical layout
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },
    /// Maintain the per-family id lookup indexes
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
    /// Generate, send, pay, or discard invoices
    Invoice {
        #[command(subcommand)]
        command: InvoiceCommands,
    },
    /// Inspect stored entities
    Inspect {
        #[command(subcommand)]
        command: InspectCommands,
    },
}

fn main() -> Result<()> {
    marketfs::logging::init();

    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Migrate { command } => commands::migrate::execute(config, command)?,
        Commands::Index { command } => commands::index::execute(config, command)?,
        Commands::Invoice { command } => commands::invoice::execute(config, command)?,
        Commands::Inspect { command } => commands::inspect::execute(config, command)?,
    }

    Ok(())
}
