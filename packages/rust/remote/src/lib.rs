//! HTTP adapter for the remote scraping service.
//!
//! Two endpoints, both `POST` with JSON bodies:
//! - `/scrape-product-urls` — category URLs in, product URLs out
//! - `/scrape-product-details` — product URLs in, detail records out
//!
//! Response bodies are read chunk by chunk so callers can derive download
//! progress. Dropping the returned future aborts the in-flight request.

mod wire;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

use scrapedesk_shared::{ProductDetailBatch, Result, ScrapeDeskError, UrlSet};

use crate::wire::{
    ErrorBody, ProductDetailsRequest, ProductDetailsResponse, ProductUrlsRequest,
    ProductUrlsResponse,
};

/// User-Agent string for service requests.
const USER_AGENT: &str = concat!("scrapedesk/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds. Scrapes walk many pages server-side.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

const PRODUCT_URLS_PATH: &str = "scrape-product-urls";
const PRODUCT_DETAILS_PATH: &str = "scrape-product-details";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Receives transport-level download progress.
pub trait TransferProgress: Send + Sync {
    /// `total` is the response's content length, when the server sent one.
    fn transferred(&self, received: u64, total: Option<u64>);
}

/// Discards progress updates.
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn transferred(&self, _received: u64, _total: Option<u64>) {}
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Configuration for [`RemoteClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for a whole request in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Client for the scraping service.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    base: Url,
}

impl RemoteClient {
    /// Build a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, opts: &ClientOptions) -> Result<Self> {
        let mut base = Url::parse(base_url).map_err(|e| {
            ScrapeDeskError::config(format!("invalid backend URL '{base_url}': {e}"))
        })?;
        // Url::join replaces the last segment unless the path ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| {
                ScrapeDeskError::remote(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Ask the service to discover product URLs on the given category pages.
    #[instrument(skip_all, fields(categories = category_urls.len(), ?limit))]
    pub async fn scrape_product_urls(
        &self,
        category_urls: &UrlSet,
        limit: Option<u32>,
        progress: &dyn TransferProgress,
    ) -> Result<UrlSet> {
        let urls = category_urls.to_strings();
        let request = ProductUrlsRequest {
            category_urls: &urls,
            limit,
        };
        let body = self.post_json(PRODUCT_URLS_PATH, &request, progress).await?;
        let response: ProductUrlsResponse = decode(&body)?;
        let product_urls = response.into_url_set();

        info!(count = product_urls.len(), "product URLs received");
        Ok(product_urls)
    }

    /// Ask the service to scrape details for each product URL.
    ///
    /// A response made only of in-band notices (no product records) is the
    /// service rejecting the request, and comes back as
    /// [`ScrapeDeskError::Remote`] carrying the notice text.
    #[instrument(skip_all, fields(products = product_urls.len()))]
    pub async fn scrape_product_details(
        &self,
        product_urls: &UrlSet,
        progress: &dyn TransferProgress,
    ) -> Result<ProductDetailBatch> {
        let urls = product_urls.to_strings();
        let request = ProductDetailsRequest {
            product_urls: &urls,
        };
        let body = self
            .post_json(PRODUCT_DETAILS_PATH, &request, progress)
            .await?;
        let response: ProductDetailsResponse = decode(&body)?;
        let batch = response.into_batch();

        if batch.records.is_empty() && !batch.notices.is_empty() {
            return Err(ScrapeDeskError::remote(batch.notices.join("; ")));
        }
        info!(
            count = batch.records.len(),
            notices = batch.notices.len(),
            "product details received"
        );
        Ok(batch)
    }

    /// POST `body` to `path` and collect the response bytes, reporting
    /// progress per chunk. Non-2xx statuses become [`ScrapeDeskError::Remote`].
    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        progress: &dyn TransferProgress,
    ) -> Result<Vec<u8>> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ScrapeDeskError::config(format!("invalid endpoint {path}: {e}")))?;

        debug!(%url, "sending request");
        let mut response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let total = response.content_length();
        let mut received: Vec<u8> = Vec::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
        progress.transferred(0, total);

        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            received.extend_from_slice(&chunk);
            progress.transferred(received.len() as u64, total);
        }

        if !status.is_success() {
            return Err(status_error(status, &received));
        }
        Ok(received)
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Pick the operator-facing message for a failed request: the service's own
/// message first, then the transport's description, then `fallback`.
pub fn describe_failure(structured: Option<&str>, transport: Option<&str>, fallback: &str) -> String {
    [structured, transport]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn status_error(status: StatusCode, body: &[u8]) -> ScrapeDeskError {
    let structured = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message);
    let transport = format!("request failed with status code {}", status.as_u16());
    ScrapeDeskError::remote(describe_failure(
        structured.as_deref(),
        Some(&transport),
        "request failed",
    ))
}

fn transport_error(e: reqwest::Error) -> ScrapeDeskError {
    ScrapeDeskError::remote(describe_failure(None, Some(&e.to_string()), "network error"))
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        ScrapeDeskError::remote(format!("unexpected response from scraping service: {e}"))
    })
}
