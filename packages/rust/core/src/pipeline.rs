//! End-to-end `ingest` job: crawl → raw artifact → normalize → store → index.
//!
//! Categories crawl concurrently, bounded by `concurrency`. Results are stored
//! from this task, one category at a time in configured order, so the store
//! sees a single writer. A category whose crawl fails stores nothing; the
//! others proceed. Store and index failures end the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use wateroflife_crawler::{CrawlResult, Crawler, HttpListingSource, ListingSource};
use wateroflife_normalizer::{SchemaRegistry, normalize_batch};
use wateroflife_shared::{AppConfig, CatalogError, Category, CrawlConfig, Result, SourceSchema};
use wateroflife_storage::Storage;

use crate::artifacts::write_raw_artifact;

/// Runtime configuration for the `ingest` job.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Categories to crawl, in report order.
    pub categories: Vec<Category>,
    /// Maximum categories crawled at once.
    pub concurrency: usize,
    /// Listing client settings.
    pub crawl: CrawlConfig,
    /// Where raw artifacts go; `None` skips them.
    pub artifact_dir: Option<PathBuf>,
    /// Mapping used to normalize crawled records.
    pub schema: SourceSchema,
}

impl IngestConfig {
    /// Build from the loaded config file. The listing's `source` must name a
    /// registered schema.
    pub fn from_app(config: &AppConfig, registry: &SchemaRegistry) -> Result<Self> {
        Ok(Self {
            categories: config.defaults.categories.clone(),
            concurrency: config.defaults.concurrency.max(1) as usize,
            crawl: CrawlConfig::from(config),
            artifact_dir: Some(PathBuf::from(&config.defaults.artifact_dir)),
            schema: registry.get(&config.listing.source)?.clone(),
        })
    }
}

/// Outcome of one category.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub pages_fetched: u32,
    pub records_fetched: usize,
    pub entries_stored: usize,
    pub records_rejected: usize,
    /// Why the category stored nothing, if it failed.
    pub error: Option<String>,
}

impl CategoryReport {
    fn new(category: Category) -> Self {
        Self {
            category,
            pages_fetched: 0,
            records_fetched: 0,
            entries_stored: 0,
            records_rejected: 0,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of the `ingest` job.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// One report per configured category, in configured order.
    pub categories: Vec<CategoryReport>,
    /// Entries in the rebuilt search index.
    pub indexed: usize,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn entries_stored(&self) -> usize {
        self.categories.iter().map(|c| c.entries_stored).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter(|c| !c.succeeded())
    }
}

/// Progress callback for reporting job status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once a category's results are stored or it has failed.
    fn category_done(&self, report: &CategoryReport, current: usize, total: usize);
    /// Called when the job completes.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn category_done(&self, _report: &CategoryReport, _current: usize, _total: usize) {}
    fn done(&self, _report: &IngestReport) {}
}

/// Run the `ingest` job against the configured HTTP listing.
pub async fn ingest(
    config: &IngestConfig,
    storage: &Storage,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let source = HttpListingSource::new(&config.crawl)?;
    ingest_from(source, config, storage, cancel, progress).await
}

/// Run the `ingest` job against any listing source.
#[instrument(skip_all, fields(categories = config.categories.len(), origin = %config.schema.origin))]
pub async fn ingest_from<S>(
    source: S,
    config: &IngestConfig,
    storage: &Storage,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport>
where
    S: ListingSource + 'static,
{
    let start = Instant::now();
    let crawler = Arc::new(
        Crawler::new(source).with_rate_limit(Duration::from_millis(config.crawl.rate_limit_ms)),
    );
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    // Cancelled on a fatal error so in-flight crawls stop with the run.
    let run_cancel = cancel.child_token();

    info!(
        concurrency = config.concurrency,
        artifacts = config.artifact_dir.is_some(),
        "starting ingest"
    );

    // --- Phase 1: Crawl ---
    progress.phase("Crawling listings");
    let mut handles = Vec::with_capacity(config.categories.len());
    for &category in &config.categories {
        let run_id = match storage.begin_crawl_run(category.as_str()).await {
            Ok(id) => id,
            Err(e) => {
                run_cancel.cancel();
                abandon_runs(storage, handles, &e).await;
                return Err(e);
            }
        };

        let crawler = crawler.clone();
        let sem = semaphore.clone();
        let token = run_cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| CatalogError::Cancelled(format!("crawl slots closed: {e}")))?;
            crawler.crawl(category, &token).await
        });
        handles.push((category, run_id, handle));
    }

    // --- Phase 2: Store ---
    let total = handles.len();
    let mut reports = Vec::with_capacity(total);
    let mut pending = handles.into_iter();
    let mut done = 0;
    while let Some((category, run_id, handle)) = pending.next() {
        let mut report = CategoryReport::new(category);

        let crawled = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CatalogError::Panicked(format!("{category} crawl"))),
            Err(e) => Err(CatalogError::Cancelled(format!("{category} crawl task failed: {e}"))),
        };

        let stored = match crawled {
            Ok(result) => store_category(config, storage, result, &mut report).await,
            Err(e) => Err(e),
        };

        let status = match stored {
            Ok(()) => "completed",
            Err(e) if e.is_category_scoped() => {
                warn!(%category, error = %e, "category failed, nothing stored");
                report.error = Some(e.to_string());
                if matches!(e, CatalogError::Cancelled(_)) {
                    "cancelled"
                } else {
                    "failed"
                }
            }
            Err(e) => {
                run_cancel.cancel();
                let stats = serde_json::json!({ "error": e.to_string() }).to_string();
                if let Err(finish) = storage.finish_crawl_run(&run_id, "failed", &stats).await {
                    warn!(%category, error = %finish, "could not record failed crawl run");
                }
                abandon_runs(storage, pending.collect(), &e).await;
                return Err(e);
            }
        };

        let stats = serde_json::to_string(&report).unwrap_or_default();
        storage.finish_crawl_run(&run_id, status, &stats).await?;

        done += 1;
        progress.category_done(&report, done, total);
        reports.push(report);
    }

    // --- Phase 3: Index ---
    progress.phase("Rebuilding search index");
    let indexed = storage.reindex_from_catalog().await?;

    let report = IngestReport {
        categories: reports,
        indexed,
        elapsed: start.elapsed(),
    };

    progress.done(&report);

    info!(
        entries_stored = report.entries_stored(),
        failed_categories = report.failed().count(),
        indexed = report.indexed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ingest complete"
    );

    Ok(report)
}

type CrawlHandle = (Category, String, JoinHandle<Result<CrawlResult>>);

/// Stop the crawls a failed run never got to and close their run records as
/// `cancelled`, so none is left `running`.
async fn abandon_runs(storage: &Storage, handles: Vec<CrawlHandle>, cause: &CatalogError) {
    let stats = serde_json::json!({ "error": format!("run ended: {cause}") }).to_string();
    for (category, run_id, handle) in handles {
        handle.abort();
        if let Err(e) = storage.finish_crawl_run(&run_id, "cancelled", &stats).await {
            warn!(%category, error = %e, "could not record abandoned crawl run");
        }
    }
}

/// Persist one successful crawl: artifact, then normalized entries.
async fn store_category(
    config: &IngestConfig,
    storage: &Storage,
    result: CrawlResult,
    report: &mut CategoryReport,
) -> Result<()> {
    report.pages_fetched = result.pages_fetched;
    report.records_fetched = result.records.len();

    if let Some(dir) = &config.artifact_dir {
        write_raw_artifact(dir, result.category, &result.records)?;
    }

    let batch = normalize_batch(&result.records, &config.schema);
    report.records_rejected = batch.rejected.len();
    report.entries_stored = storage.put_all(&batch.entries).await?;

    info!(
        category = %result.category,
        pages = report.pages_fetched,
        stored = report.entries_stored,
        rejected = report.records_rejected,
        "category stored"
    );
    Ok(())
}
