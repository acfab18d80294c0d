use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use marketfs::paths::Family;

use super::open_storage;

#[derive(Subcommand)]
pub enum IndexCommands {
    /// Regenerate a family's id lookup index from a full directory walk
    Rebuild(RebuildArgs),
}

#[derive(Args)]
pub struct RebuildArgs {
    /// Entity family (projects, tasks, invoices, gigs, users, organizations),
    /// or "all"
    pub family: String,
}

pub fn execute(config_path: Option<PathBuf>, command: IndexCommands) -> Result<()> {
    let (_config, storage) = open_storage(config_path)?;

    match command {
        IndexCommands::Rebuild(args) => {
            let families: Vec<Family> = if args.family == "all" {
                Family::ALL.to_vec()
            } else {
                vec![args.family.parse()?]
            };
            for family in families {
                let count = match family {
                    Family::Projects => storage.projects.index().rebuild()?,
                    Family::Tasks => storage.tasks.index().rebuild()?,
                    Family::Invoices => storage.invoices.index().rebuild()?,
                    Family::Gigs => storage.gigs.index().rebuild()?,
                    Family::Users => storage.users.index().rebuild()?,
                    Family::Organizations => storage.organizations.index().rebuild()?,
                };
                println!("{family}: {count} entries");
            }
        }
    }
    Ok(())
}
