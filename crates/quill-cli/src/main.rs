//! Quill CLI - Records, search and index maintenance

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod catalog;
mod commands;
mod config;
mod output;

use catalog::Catalog;
use commands::{completions, index, record, search};
use config::{config_file_path, Config, StoreKind};
use quill_core::MapperRegistry;
use quill_search::{BackendKind, IndexGateway, IndexWriter, IndexingService, QueryEngine};
use quill_storage::{MemoryStore, RecordStore};

#[derive(Parser)]
#[command(name = "quill")]
#[command(author, version, about = "Keep a search index in step with the books, codekeeper and timekeeper records")]
pub struct Cli {
    /// Data directory
    #[arg(short, long, global = true, env = "QUILL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file (default: <config dir>/quill/config.toml)
    #[arg(long, global = true, env = "QUILL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Search backend: tantivy, solr, memory
    #[arg(long, global = true, env = "QUILL_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Record store
    #[arg(long, global = true, env = "QUILL_STORE")]
    pub store: Option<StoreKind>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_file_path)
    }

    /// Config file merged with command-line overrides
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(&self.config_path())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(backend) = self.backend {
            config.search.backend = backend;
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, read and delete records
    Record(record::RecordArgs),
    /// Search the index
    Search(search::SearchArgs),
    /// Maintain the search index
    Index(index::IndexArgs),
    /// Serve the HTTP query API
    Serve {
        /// Address to bind (default: server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with store, index and query engine
pub struct AppContext {
    pub config: Config,
    pub catalog: Catalog,
    pub engine: QueryEngine,
}

fn open_store(config: &Config, data_dir: &std::path::Path) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        #[cfg(feature = "redb")]
        StoreKind::Redb => {
            let path = data_dir.join("quill.redb");
            tracing::debug!("Using database at: {:?}", path);
            Arc::new(quill_storage::RedbStore::open(&path)?)
        }
        #[cfg(feature = "sqlite")]
        StoreKind::Sqlite => {
            let path = data_dir.join("quill.sqlite3");
            tracing::debug!("Using database at: {:?}", path);
            Arc::new(quill_storage::SqliteStore::open(&path)?)
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!(
            "store '{}' not compiled in (enable the '{}' feature)",
            other.as_str(),
            other.as_str()
        ),
    };
    Ok(store)
}

impl AppContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let store = open_store(&config, &data_dir)?;
        store.initialize().await?;

        let mut search = config.search.clone();
        if search.index_path.is_none() {
            search.index_path = Some(data_dir.join("index"));
        }
        let gateway = IndexGateway::from_config(&search)?;
        tracing::debug!(backend = gateway.backend(), "Search index ready");

        let indexing = IndexingService::new(MapperRegistry::standard(), IndexWriter::new(gateway.clone()));
        let engine = QueryEngine::new(gateway).with_rows(search.rows);

        let catalog = Catalog::new(store, indexing).with_pending_file(data_dir.join("reconcile.json"));
        catalog.restore_pending()?;

        Ok(Self {
            config,
            catalog,
            engine,
        })
    }
}

async fn dispatch(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Record(args) => record::run(args, cli, ctx).await,
        Commands::Search(args) => search::run(args, cli, ctx).await,
        Commands::Index(args) => index::run(args, cli, ctx).await,
        Commands::Serve { bind } => {
            let addr = bind.clone().unwrap_or_else(|| ctx.config.server.bind.clone());
            let state = quill_web::AppState::new(ctx.engine.clone())
                .with_indexing(ctx.catalog.indexing().clone())
                .with_default_facets(ctx.config.search.facet_fields.clone());
            quill_web::serve(Arc::new(state), &addr).await
        }
        Commands::Config(_) | Commands::Completions(_) => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting quill CLI");

    // These never touch the store or the index
    match &cli.command {
        Commands::Config(args) => return commands::config::run(args, &cli.config_path()),
        Commands::Completions(args) => return completions::run(args),
        _ => {}
    }

    let ctx = AppContext::new(cli.load_config()?).await?;
    let result = dispatch(&cli, &ctx).await;
    ctx.catalog.save_pending()?;
    result
}
