use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use marketfs::migration::MigrationService;

use super::open_storage;

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Compare the legacy and hierarchical layouts without mutating anything
    Analyze,
    /// Migrate legacy entities missing from the hierarchical layout
    Run,
    /// Check structural invariants of the hierarchical layout
    Validate,
}

pub fn execute(config_path: Option<PathBuf>, command: MigrateCommands) -> Result<()> {
    let (config, storage) = open_storage(config_path)?;
    let service = MigrationService::new(&storage, config.legacy_dir.clone());

    match command {
        MigrateCommands::Analyze => {
            let report = service.analyze()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_clean() {
                println!("layouts agree");
            }
        }
        MigrateCommands::Run => {
            let outcome = service.migrate()?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        MigrateCommands::Validate => {
            let report = service.validate()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_clean() {
                println!("no inconsistencies found");
            } else {
                anyhow::bail!("validation found {} issue(s)", report.issues.len());
            }
        }
    }
    Ok(())
}
