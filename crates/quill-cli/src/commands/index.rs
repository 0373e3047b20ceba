//! Index maintenance commands

use clap::{Args, Subcommand};

use crate::output::{to_json, OutputFormat};
use crate::{AppContext, Cli};
use quill_core::{EntityKind, SearchRequest};

#[derive(Args)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommands,
}

#[derive(Subcommand)]
pub enum IndexCommands {
    /// Rebuild the index from every stored record
    Reindex {
        /// Delete every document first
        #[arg(long)]
        clear: bool,
    },
    /// Delete every document in the index
    Clear {
        /// Required; there is no undo
        #[arg(long)]
        force: bool,
    },
    /// Show document counts per type and the reconciliation backlog
    Status,
    /// Retry records whose last index sync failed
    Reconcile,
}

pub async fn run(args: &IndexArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        IndexCommands::Reindex { clear } => {
            let report = ctx.catalog.reindex(*clear).await?;
            println!("Reindexed {} records ({} failed)", report.synced, report.failed);
            if report.failed > 0 {
                anyhow::bail!("{} records could not be indexed; run 'quill index reconcile' later", report.failed);
            }
        }
        IndexCommands::Clear { force } => {
            if !force {
                anyhow::bail!("Refusing to clear the index without --force");
            }
            ctx.catalog.indexing().writer().clear().await?;
            println!("Index cleared");
        }
        IndexCommands::Status => {
            let gateway = ctx.engine.gateway();
            let healthy = gateway.health_check().await.unwrap_or(false);
            let (_, facets) = ctx
                .engine
                .try_search_with_facets(&SearchRequest::empty().with_facet("type"))
                .await?;
            let per_type = facets.get("type").cloned().unwrap_or_default();
            let pending = ctx.catalog.indexing().pending_reconciliation();

            let mut stored = Vec::new();
            for kind in EntityKind::ALL {
                let count = ctx.catalog.store().list(kind).await?.len();
                stored.push((kind, count, per_type.get(kind.as_str()).copied().unwrap_or(0)));
            }

            match OutputFormat::from(cli.format.as_str()) {
                OutputFormat::Json => {
                    let types: Vec<_> = stored
                        .iter()
                        .map(|(kind, records, documents)| {
                            serde_json::json!({
                                "type": kind.as_str(),
                                "records": records,
                                "documents": documents,
                            })
                        })
                        .collect();
                    println!(
                        "{}",
                        to_json(&serde_json::json!({
                            "backend": gateway.backend(),
                            "healthy": healthy,
                            "types": types,
                            "pending_reconciliation": pending,
                        }))
                    );
                }
                OutputFormat::Table => {
                    println!("Backend: {} ({})", gateway.backend(), if healthy { "ok" } else { "unhealthy" });
                    println!("{:<22} {:>8} {:>10}", "TYPE", "RECORDS", "DOCUMENTS");
                    for (kind, records, documents) in &stored {
                        println!("{:<22} {:>8} {:>10}", kind.as_str(), records, documents);
                    }
                    println!("Pending reconciliation: {}", pending.len());
                }
            }
        }
        IndexCommands::Reconcile => {
            let pending = ctx.catalog.indexing().pending_count();
            if pending == 0 {
                println!("Nothing to reconcile");
                return Ok(());
            }
            let report = ctx.catalog.reconcile().await?;
            println!("Reconciled {} of {} records", report.synced, pending);
            if report.failed > 0 {
                anyhow::bail!("{} records still out of sync", report.failed);
            }
        }
    }
    Ok(())
}
