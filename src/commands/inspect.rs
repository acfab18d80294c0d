use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::Value;

use marketfs::{paths::Family, store::StorageClient};

use super::open_storage;

#[derive(Subcommand)]
pub enum InspectCommands {
    /// Print one entity as JSON
    Get(GetArgs),
    /// Print every entity of a family (full directory walk)
    List(ListArgs),
}

#[derive(Args)]
pub struct GetArgs {
    /// Entity family
    pub family: String,

    /// Entity identifier
    pub id: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Entity family
    pub family: String,
}

pub fn execute(config_path: Option<PathBuf>, command: InspectCommands) -> Result<()> {
    let (_config, storage) = open_storage(config_path)?;

    match command {
        InspectCommands::Get(args) => {
            let family: Family = args.family.parse()?;
            match read_value(&storage, family, &args.id)? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("{} {} not found", family, args.id),
            }
        }
        InspectCommands::List(args) => {
            let family: Family = args.family.parse()?;
            let values = list_values(&storage, family)?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }
    Ok(())
}

fn read_value(storage: &StorageClient, family: Family, id: &str) -> Result<Option<Value>> {
    let value = match family {
        Family::Projects => storage.projects.read(id)?.map(|e| serde_json::to_value(e)),
        Family::Tasks => storage.tasks.read(id)?.map(|e| serde_json::to_value(e)),
        Family::Invoices => storage.invoices.read(id)?.map(|e| serde_json::to_value(e)),
        Family::Gigs => storage.gigs.read(id)?.map(|e| serde_json::to_value(e)),
        Family::Users => storage.users.read(id)?.map(|e| serde_json::to_value(e)),
        Family::Organizations => storage
            .organizations
            .read(id)?
            .map(|e| serde_json::to_value(e)),
    };
    Ok(value.transpose()?)
}

fn list_values(storage: &StorageClient, family: Family) -> Result<Value> {
    let value = match family {
        Family::Projects => serde_json::to_value(storage.projects.list_all()?),
        Family::Tasks => serde_json::to_value(storage.tasks.list_all()?),
        Family::Invoices => serde_json::to_value(storage.invoices.list_all()?),
        Family::Gigs => serde_json::to_value(storage.gigs.list_all()?),
        Family::Users => serde_json::to_value(storage.users.list_all()?),
        Family::Organizations => serde_json::to_value(storage.organizations.list_all()?),
    };
    Ok(value?)
}
