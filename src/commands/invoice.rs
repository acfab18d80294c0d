use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use marketfs::reconciliation::ReconciliationService;

use super::open_storage;

#[derive(Subcommand)]
pub enum InvoiceCommands {
    /// Build a draft invoice from a project's approved unbilled tasks
    Generate(GenerateArgs),
    /// Transition a draft invoice to sent
    Send(InvoiceIdArgs),
    /// Settle a sent invoice: fee split, wallet credit, notifications
    MarkPaid(InvoiceIdArgs),
    /// Discard a draft invoice
    Discard(InvoiceIdArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Project identifier
    pub project_id: String,

    /// Retry transient storage failures with backoff
    #[arg(long, default_value_t = false)]
    pub retry: bool,
}

#[derive(Args)]
pub struct InvoiceIdArgs {
    /// Invoice identifier
    pub invoice_id: String,
}

pub fn execute(config_path: Option<PathBuf>, command: InvoiceCommands) -> Result<()> {
    let (config, storage) = open_storage(config_path)?;
    let service = ReconciliationService::new(&storage, &config);

    match command {
        InvoiceCommands::Generate(args) => {
            let invoice = if args.retry {
                service.generate_invoice_with_retry(&args.project_id)?
            } else {
                service.generate_invoice(&args.project_id)?
            };
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        InvoiceCommands::Send(args) => {
            let invoice = service.send_invoice(&args.invoice_id)?;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        InvoiceCommands::MarkPaid(args) => {
            let outcome = service.mark_invoice_paid(&args.invoice_id)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        InvoiceCommands::Discard(args) => {
            let invoice = service.discard_draft(&args.invoice_id)?;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
    }
    Ok(())
}
