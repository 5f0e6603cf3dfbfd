//! Two-phase scrape pipeline: URL discovery, then detail extraction.
//!
//! Phase 2 only runs on the exact result phase 1 produced, and only one phase
//! is ever in flight. Remote failures and cancellations become phase state
//! (see [`PhaseSnapshot`]); caller mistakes come back as `Err`.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use scrapedesk_remote::{RemoteClient, TransferProgress};
use scrapedesk_shared::{
    JobPhase, PhaseKind, ProductDetailBatch, ProductDetailRecord, ProductUrlResult, Result,
    ScrapeDeskError, UrlSet,
};

use crate::log::LogSink;
use crate::runner::{JobOutcome, JobRunner, PhaseSnapshot, ProgressReporter, SilentProgress};

const URL_FAILURE_FALLBACK: &str = "Failed to scrape product URLs.";
const DETAIL_FAILURE_FALLBACK: &str = "Failed to scrape product details.";

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The remote scraping service as seen by the orchestrator.
pub trait ScrapeBackend: Send + Sync {
    fn scrape_product_urls(
        &self,
        category_urls: &UrlSet,
        limit: Option<u32>,
        progress: &dyn TransferProgress,
    ) -> impl Future<Output = Result<UrlSet>> + Send;

    fn scrape_product_details(
        &self,
        product_urls: &UrlSet,
        progress: &dyn TransferProgress,
    ) -> impl Future<Output = Result<ProductDetailBatch>> + Send;
}

impl ScrapeBackend for RemoteClient {
    fn scrape_product_urls(
        &self,
        category_urls: &UrlSet,
        limit: Option<u32>,
        progress: &dyn TransferProgress,
    ) -> impl Future<Output = Result<UrlSet>> + Send {
        RemoteClient::scrape_product_urls(self, category_urls, limit, progress)
    }

    fn scrape_product_details(
        &self,
        product_urls: &UrlSet,
        progress: &dyn TransferProgress,
    ) -> impl Future<Output = Result<ProductDetailBatch>> + Send {
        RemoteClient::scrape_product_details(self, product_urls, progress)
    }
}

// ---------------------------------------------------------------------------
// ScrapeOrchestrator
// ---------------------------------------------------------------------------

/// Owns both phase runners, their results, and the job log.
pub struct ScrapeOrchestrator<B> {
    backend: B,
    reporter: Arc<dyn ProgressReporter>,
    url_phase: JobRunner,
    detail_phase: JobRunner,
    /// Serializes "check preconditions, then enter Running".
    start_gate: Mutex<()>,
    product_urls: Mutex<Option<ProductUrlResult>>,
    product_details: Mutex<Option<Vec<ProductDetailRecord>>>,
    log: LogSink,
}

impl<B: ScrapeBackend> ScrapeOrchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            reporter: Arc::new(SilentProgress),
            url_phase: JobRunner::new(PhaseKind::UrlDiscovery, URL_FAILURE_FALLBACK),
            detail_phase: JobRunner::new(PhaseKind::DetailExtraction, DETAIL_FAILURE_FALLBACK),
            start_gate: Mutex::new(()),
            product_urls: Mutex::new(None),
            product_details: Mutex::new(None),
            log: LogSink::new(),
        }
    }

    /// Route progress updates to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    // -----------------------------------------------------------------------
    // Phase 1
    // -----------------------------------------------------------------------

    /// Discover product URLs from the given category URLs.
    ///
    /// `limit`, when given, must be positive. Starting this phase discards the
    /// previous discovery result.
    #[instrument(skip_all, fields(categories = category_urls.len(), ?limit))]
    pub async fn run_url_discovery_phase(
        &self,
        category_urls: &UrlSet,
        limit: Option<u32>,
    ) -> Result<JobOutcome<ProductUrlResult>> {
        if limit == Some(0) {
            return Err(ScrapeDeskError::validation("limit must be a positive integer"));
        }
        if category_urls.is_empty() {
            return Err(ScrapeDeskError::validation("no category URLs to scrape"));
        }

        let job = {
            let _gate = lock(&self.start_gate);
            ensure_not_running(&self.detail_phase)?;
            self.url_phase.start(&self.reporter)?
        };
        *lock(&self.product_urls) = None;
        self.log.append("Started scraping product URLs...");

        let backend = &self.backend;
        let slot = &self.product_urls;
        let outcome = job
            .run(|progress| async move {
                let urls = backend
                    .scrape_product_urls(category_urls, limit, &*progress)
                    .await?;
                let result = ProductUrlResult::new(urls);
                *lock(slot) = Some(result.clone());
                Ok::<_, ScrapeDeskError>(result)
            })
            .await;

        match &outcome {
            JobOutcome::Succeeded(result) => {
                self.log
                    .append(format!("Scraped {} product URLs.", result.len()));
            }
            JobOutcome::Cancelled => {
                self.log.append("Scraping product URLs cancelled.");
            }
            JobOutcome::Failed(message) => {
                self.log
                    .append(format!("Error scraping product URLs: {message}"));
            }
        }
        self.log.append("Finished scraping product URLs.");
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Phase 2
    // -----------------------------------------------------------------------

    /// Scrape details for the product URLs phase 1 produced.
    ///
    /// Rejected without contacting the service unless phase 1 has Succeeded
    /// with a non-empty result and `product_urls` is that very result.
    #[instrument(skip_all, fields(products = product_urls.len()))]
    pub async fn run_detail_phase(
        &self,
        product_urls: &ProductUrlResult,
    ) -> Result<JobOutcome<Vec<ProductDetailRecord>>> {
        let job = {
            let _gate = lock(&self.start_gate);
            ensure_not_running(&self.url_phase)?;
            self.ensure_detail_input(product_urls)?;
            self.detail_phase.start(&self.reporter)?
        };
        *lock(&self.product_details) = None;
        self.log.append("Started scraping product details...");

        let backend = &self.backend;
        let slot = &self.product_details;
        let log = &self.log;
        let outcome = job
            .run(|progress| async move {
                let batch = backend
                    .scrape_product_details(product_urls, &*progress)
                    .await?;
                for notice in &batch.notices {
                    log.append(format!("Service notice: {notice}"));
                }
                *lock(slot) = Some(batch.records.clone());
                Ok::<_, ScrapeDeskError>(batch.records)
            })
            .await;

        match &outcome {
            JobOutcome::Succeeded(records) => {
                self.log
                    .append(format!("Scraped details for {} products.", records.len()));
            }
            JobOutcome::Cancelled => {
                self.log.append("Scraping product details cancelled.");
            }
            JobOutcome::Failed(message) => {
                self.log
                    .append(format!("Error scraping product details: {message}"));
            }
        }
        self.log.append("Finished scraping product details.");
        Ok(outcome)
    }

    fn ensure_detail_input(&self, product_urls: &ProductUrlResult) -> Result<()> {
        if self.url_phase.state() != JobPhase::Succeeded {
            return Err(ScrapeDeskError::validation(
                "product URL discovery has not succeeded yet",
            ));
        }
        let current = lock(&self.product_urls);
        match current.as_ref() {
            Some(current) if current.same_result(product_urls) => {}
            _ => {
                return Err(ScrapeDeskError::validation(
                    "product URLs do not come from the latest discovery run",
                ));
            }
        }
        if product_urls.is_empty() {
            return Err(ScrapeDeskError::validation(
                "URL discovery found no product URLs",
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cancel / reset
    // -----------------------------------------------------------------------

    /// Ask the running URL discovery job to stop. `false` if none is running.
    pub fn cancel_url_phase(&self) -> bool {
        let signalled = self.url_phase.cancel();
        if signalled {
            self.log.append("Product URLs scraping cancelled by user.");
        }
        signalled
    }

    /// Ask the running detail job to stop. `false` if none is running.
    pub fn cancel_detail_phase(&self) -> bool {
        let signalled = self.detail_phase.cancel();
        if signalled {
            self.log.append("Product details scraping cancelled by user.");
        }
        signalled
    }

    /// Clear the discovery result and return phase 1 to Idle. Detail results
    /// are left as they are.
    pub fn reset_url_phase(&self) -> Result<()> {
        let _gate = lock(&self.start_gate);
        self.url_phase.reset()?;
        *lock(&self.product_urls) = None;
        Ok(())
    }

    /// Clear the detail records and return phase 2 to Idle.
    pub fn reset_detail_phase(&self) -> Result<()> {
        let _gate = lock(&self.start_gate);
        self.detail_phase.reset()?;
        *lock(&self.product_details) = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn url_snapshot(&self) -> PhaseSnapshot {
        self.url_phase.snapshot()
    }

    pub fn detail_snapshot(&self) -> PhaseSnapshot {
        self.detail_phase.snapshot()
    }

    /// The latest successful discovery result, if any.
    pub fn product_urls(&self) -> Option<ProductUrlResult> {
        lock(&self.product_urls).clone()
    }

    /// Detail records of the latest successful detail run (empty if none).
    pub fn product_details(&self) -> Vec<ProductDetailRecord> {
        lock(&self.product_details).clone().unwrap_or_default()
    }

    pub fn logs(&self) -> &LogSink {
        &self.log
    }
}

fn ensure_not_running(runner: &JobRunner) -> Result<()> {
    if runner.is_running() {
        return Err(ScrapeDeskError::JobAlreadyRunning {
            phase: runner.phase(),
        });
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
