//! Page fetching and tournament extraction for the Schachinter tracker.

pub mod crawl_job;
pub mod extract;
pub mod fetch;

use async_trait::async_trait;
use tokio::sync::watch;

pub const CRATE_NAME: &str = "turnier-scrape";

pub use crawl_job::{CrawlJobClient, HttpJobService, JobService, JobStatus, PollConfig};
pub use extract::{Extraction, ExtractionOutcome, Extractor, SkipReason};
pub use fetch::{FetchConfig, FetchError, PageFetcher};

/// Seam between the orchestrator and whichever fetch path is configured.
///
/// The shutdown receiver lets a long poll loop abort mid-wait; the direct
/// path is bounded by its request timeout and ignores it.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<String, FetchError>;
}

/// Configured fetch path: direct HTTP, or the asynchronous crawl service.
pub enum PageSource {
    Direct(PageFetcher),
    CrawlService(CrawlJobClient<HttpJobService>),
}

#[async_trait]
impl PageProvider for PageSource {
    async fn fetch(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<String, FetchError> {
        match self {
            PageSource::Direct(fetcher) => fetcher.fetch(url).await,
            PageSource::CrawlService(client) => client.fetch(url, shutdown).await,
        }
    }
}
