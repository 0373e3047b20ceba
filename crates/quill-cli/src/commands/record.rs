//! Record commands

use std::io::Read;

use clap::{Args, Subcommand};

use super::describe_sync;
use crate::output::{record_line, to_json, OutputFormat};
use crate::{AppContext, Cli};
use quill_core::{EntityKind, Record};

#[derive(Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    pub command: RecordCommands,
}

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Create or update a record from JSON with a "kind" field, e.g.
    /// {"kind": "tag", "name": "python"}. A record without an id is created.
    Put {
        /// Record JSON, or '-' to read stdin
        json: String,
    },
    /// Show a record
    Get {
        /// Entity kind (author, book, person, tag, language, snippet,
        /// timekeeper_person, timekeeper_place, timekeeper_activity)
        kind: EntityKind,
        /// Record id
        id: i64,
    },
    /// List records
    List {
        /// Only this kind
        kind: Option<EntityKind>,
    },
    /// Delete a record
    Delete {
        kind: EntityKind,
        id: i64,
    },
}

fn read_record(json: &str) -> anyhow::Result<Record> {
    let text = if json == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        json.to_string()
    };
    serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Invalid record JSON: {}", e))
}

pub async fn run(args: &RecordArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let format = OutputFormat::from(cli.format.as_str());

    match &args.command {
        RecordCommands::Put { json } => {
            let record = read_record(json)?;
            let synced = ctx.catalog.save(record).await?;
            tracing::info!(kind = %synced.record.kind(), item_id = synced.record.item_id(), "Saved record");

            match format {
                OutputFormat::Json => println!("{}", to_json(&synced.record)),
                OutputFormat::Table => {
                    if !cli.quiet {
                        println!(
                            "Saved {} ({})",
                            record_line(&synced.record),
                            describe_sync(&synced.index)
                        );
                    }
                }
            }
        }
        RecordCommands::Get { kind, id } => match ctx.catalog.store().get(*kind, *id).await? {
            Some(record) => println!("{}", to_json(&record)),
            None => anyhow::bail!("{} {} not found", kind, id),
        },
        RecordCommands::List { kind } => {
            let records = match kind {
                Some(kind) => ctx.catalog.store().list(*kind).await?,
                None => ctx.catalog.store().list_all().await?,
            };
            match format {
                OutputFormat::Json => println!("{}", to_json(&records)),
                OutputFormat::Table => {
                    if records.is_empty() {
                        println!("No records found");
                    }
                    for record in &records {
                        println!("{}", record_line(record));
                    }
                }
            }
        }
        RecordCommands::Delete { kind, id } => match ctx.catalog.delete(*kind, *id).await? {
            Some(synced) => {
                if !cli.quiet {
                    println!(
                        "Deleted {} ({})",
                        record_line(&synced.record),
                        describe_sync(&synced.index)
                    );
                }
            }
            None => anyhow::bail!("{} {} not found", kind, id),
        },
    }

    Ok(())
}
