//! Pagination engine: walks every page of one category's listing.
//!
//! A crawl starts at page 1, keeps the largest page count any response has
//! reported, and stops once the page number passes it. Page 1 is always
//! requested. Any failure aborts the category; no partial result escapes.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use wateroflife_shared::{CatalogError, Category, PageCursor, RawRecord, Result};

use crate::source::ListingSource;

// ---------------------------------------------------------------------------
// CrawlResult
// ---------------------------------------------------------------------------

/// Summary and payload of a completed category crawl.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub category: Category,
    /// Every record, pages concatenated in request order.
    pub records: Vec<RawRecord>,
    pub pages_fetched: u32,
    /// Final page count after taking the max of every reported value.
    pub total_pages: i64,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Sequential page walker over a [`ListingSource`].
pub struct Crawler<S> {
    source: S,
    rate_limit: Duration,
}

impl<S: ListingSource> Crawler<S> {
    /// Create a crawler with no delay between requests.
    pub fn new(source: S) -> Self {
        Self {
            source,
            rate_limit: Duration::ZERO,
        }
    }

    /// Wait at least `rate_limit` between consecutive page requests.
    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Fetch every page of `category`, in order.
    ///
    /// Returns [`CatalogError::Cancelled`] as soon as `cancel` fires, even
    /// mid-request.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn crawl(&self, category: Category, cancel: &CancellationToken) -> Result<CrawlResult> {
        let start_time = Instant::now();
        let mut cursor = PageCursor::new(category);
        let mut records: Vec<RawRecord> = Vec::new();
        let mut pages_fetched: u32 = 0;

        info!(rate_limit_ms = self.rate_limit.as_millis() as u64, "starting crawl");

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(&cursor));
            }

            if pages_fetched > 0 && !self.rate_limit.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(cancelled(&cursor)),
                    _ = tokio::time::sleep(self.rate_limit) => {}
                }
            }

            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&cursor)),
                page = self.source.fetch_page(category, cursor.page_number) => page?,
            };

            debug!(
                page = cursor.page_number,
                reported_total = page.total_pages,
                records = page.records.len(),
                "page fetched"
            );

            pages_fetched += 1;
            records.extend(page.records);
            cursor.advance(page.total_pages);

            if cursor.is_exhausted() {
                break;
            }
        }

        let result = CrawlResult {
            category,
            records,
            pages_fetched,
            total_pages: cursor.total_pages,
            duration: start_time.elapsed(),
        };

        info!(
            pages_fetched = result.pages_fetched,
            total_pages = result.total_pages,
            records = result.records.len(),
            duration_ms = result.duration.as_millis() as u64,
            "crawl completed"
        );

        Ok(result)
    }
}

fn cancelled(cursor: &PageCursor) -> CatalogError {
    CatalogError::Cancelled(format!(
        "{} crawl stopped before page {}",
        cursor.category, cursor.page_number
    ))
}
