//! Search commands

use clap::Args;

use crate::output::{document_line, facet_lines, to_json, OutputFormat};
use crate::{AppContext, Cli};
use quill_core::SearchRequest;

#[derive(Args)]
pub struct SearchArgs {
    /// Search query: free text or field:value
    pub query: Option<String>,

    /// Return only these fields (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Count facets for a field (can be used multiple times)
    #[arg(long)]
    pub facet: Vec<String>,

    /// Limit results (default: search.rows from config)
    #[arg(short, long)]
    pub rows: Option<usize>,
}

pub async fn run(args: &SearchArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let request = SearchRequest {
        text: args.query.clone(),
        return_fields: (!args.fields.is_empty()).then(|| args.fields.clone()),
        facet_fields: args.facet.clone(),
        rows: args.rows,
    };

    let response = if request.facet_fields.is_empty() {
        ctx.engine.execute(&request).await
    } else {
        ctx.engine.execute_with_facets(&request).await
    };

    match OutputFormat::from(cli.format.as_str()) {
        OutputFormat::Json => println!("{}", to_json(&response)),
        OutputFormat::Table => {
            if response.results.is_empty() {
                if response.error.is_none() {
                    println!("No results found");
                }
            } else {
                for doc in &response.results {
                    println!("{}", document_line(doc));
                }
            }
            if let Some(facets) = &response.facets {
                for line in facet_lines(facets) {
                    println!("{}", line);
                }
            }
        }
    }

    if let Some(error) = response.error {
        anyhow::bail!("Search failed: {}", error);
    }

    tracing::info!("Search returned {} results", response.results.len());
    Ok(())
}
