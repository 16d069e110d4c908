//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wateroflife_core::{
    CategoryReport, ImportSource, IngestConfig, IngestReport, ProgressReporter,
};
use wateroflife_normalizer::SchemaRegistry;
use wateroflife_shared::{
    AppConfig, Category, init_config, load_config, load_config_from, validate_config,
};
use wateroflife_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Water of Life: crawl, normalize and search a spirits catalog.
#[derive(Parser)]
#[command(
    name = "wateroflife",
    version,
    about = "Crawl spirit listings into a local catalog and search it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.wateroflife/wateroflife.toml).
    #[arg(long, global = true, env = "WATEROFLIFE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database, overriding the config file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl the listing service and refresh the catalog and index.
    Ingest {
        /// Category to crawl (repeatable). Defaults to the configured list.
        #[arg(short, long = "category")]
        categories: Vec<Category>,

        /// Skip writing raw per-category artifacts.
        #[arg(long)]
        no_artifacts: bool,
    },

    /// Import an existing dataset through the normalizer.
    Import {
        /// Origin whose field mapping applies (e.g. bottleraiders, whiskybase).
        #[arg(long)]
        source: String,

        /// SQLite database to read from.
        #[arg(long, conflicts_with = "json", requires = "table", required_unless_present = "json")]
        sqlite: Option<PathBuf>,

        /// Table within the SQLite database.
        #[arg(long, requires = "sqlite")]
        table: Option<String>,

        /// JSON array of records to read from.
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Rebuild the search index from the catalog.
    Reindex,

    /// Search the catalog index.
    Search {
        /// Match term: words, "phrases", prefix*, AND/OR/NOT, column:term.
        term: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show one catalog entry.
    Get {
        /// Entry id, e.g. listing:1234.
        id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "wateroflife=info",
        1 => "wateroflife=debug",
        _ => "wateroflife=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        };
    }

    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.defaults.database_path = db.to_string_lossy().into_owned();
    }
    let db_path = PathBuf::from(&config.defaults.database_path);

    match cli.command {
        Command::Ingest {
            categories,
            no_artifacts,
        } => cmd_ingest(config, &db_path, categories, no_artifacts).await,
        Command::Import {
            source,
            sqlite,
            table,
            json,
        } => cmd_import(&config, &db_path, &source, sqlite, table, json).await,
        Command::Reindex => cmd_reindex(&db_path).await,
        Command::Search { term, json } => cmd_search(&db_path, &term, json).await,
        Command::Get { id } => cmd_get(&db_path, &id).await,
        Command::Config { .. } => Ok(()),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    mut config: AppConfig,
    db_path: &Path,
    categories: Vec<Category>,
    no_artifacts: bool,
) -> Result<()> {
    if !categories.is_empty() {
        config.defaults.categories = categories;
    }

    let registry = SchemaRegistry::from_config(&config.sources);
    let mut ingest_config = IngestConfig::from_app(&config, &registry)?;
    if no_artifacts {
        ingest_config.artifact_dir = None;
    }

    let storage = Storage::open(db_path).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight crawls");
            on_signal.cancel();
        }
    });

    info!(
        categories = ingest_config.categories.len(),
        db = %db_path.display(),
        "starting ingest"
    );

    let reporter = CliProgress::new();
    let report = wateroflife_core::ingest(&ingest_config, &storage, &cancel, &reporter).await?;

    println!();
    println!("  {:<10} {:>6} {:>8} {:>7} {:>9}", "Category", "Pages", "Records", "Stored", "Rejected");
    for c in &report.categories {
        match &c.error {
            None => println!(
                "  {:<10} {:>6} {:>8} {:>7} {:>9}",
                c.category.as_str(),
                c.pages_fetched,
                c.records_fetched,
                c.entries_stored,
                c.records_rejected
            ),
            Some(e) => println!("  {:<10} failed: {e}", c.category.as_str()),
        }
    }
    println!();
    println!("  Indexed: {}", report.indexed);
    println!("  Time:    {:.1}s", report.elapsed.as_secs_f64());
    println!();

    let failed = report.failed().count();
    if failed > 0 {
        return Err(eyre!("{failed} of {} categories failed", report.categories.len()));
    }
    Ok(())
}

async fn cmd_import(
    config: &AppConfig,
    db_path: &Path,
    origin: &str,
    sqlite: Option<PathBuf>,
    table: Option<String>,
    json: Option<PathBuf>,
) -> Result<()> {
    let source = match (sqlite, table, json) {
        (Some(path), Some(table), None) => ImportSource::Sqlite { path, table },
        (None, None, Some(path)) => ImportSource::Json { path },
        _ => return Err(eyre!("pass either --sqlite PATH --table NAME or --json PATH")),
    };

    let registry = SchemaRegistry::from_config(&config.sources);
    let schema = registry.get(origin)?;
    let storage = Storage::open(db_path).await?;

    info!(origin, ?source, "importing dataset");
    let report = wateroflife_core::import(&source, schema, &storage).await?;

    println!();
    println!("  Rows read: {}", report.rows_read);
    println!("  Stored:    {}", report.entries_stored);
    println!("  Rejected:  {}", report.records_rejected);
    println!("  Indexed:   {}", report.indexed);
    println!();
    Ok(())
}

async fn cmd_reindex(db_path: &Path) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let indexed = storage.reindex_from_catalog().await?;
    println!("Indexed {indexed} entries");
    Ok(())
}

async fn cmd_search(db_path: &Path, term: &str, json: bool) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let hits = storage.search(term).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches for {term:?}");
        return Ok(());
    }

    println!("{:<28} {:<36} {:<24} {:<24} {}", "ID", "NAME", "DISTILLER", "BOTTLER", "TYPE");
    for hit in &hits {
        println!(
            "{:<28} {:<36} {:<24} {:<24} {}",
            hit.id, hit.name, hit.distiller, hit.bottler, hit.spirit_type
        );
    }
    Ok(())
}

async fn cmd_get(db_path: &Path, id: &str) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let entry = storage
        .get(id)
        .await?
        .ok_or_else(|| eyre!("no catalog entry with id '{id}'"))?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn category_done(&self, report: &CategoryReport, current: usize, total: usize) {
        let outcome = match &report.error {
            None => format!("{} stored", report.entries_stored),
            Some(_) => "failed".to_string(),
        };
        self.spinner
            .set_message(format!("[{current}/{total}] {}: {outcome}", report.category));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}
