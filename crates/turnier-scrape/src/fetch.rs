//! Direct HTTP page fetch.

use std::time::Duration;

use anyhow::Context;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("crawl job still pending after {waited_secs}s")]
    CrawlTimeout { waited_secs: u64 },
    #[error("crawl job failed: {0}")]
    CrawlJob(String),
    #[error("fetch cancelled by shutdown")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

/// Fetches the listing page with the configured user-agent and timeout.
///
/// No retries here: a failed fetch fails the run, and the next scheduled
/// tick is the retry.
#[derive(Debug)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = response.text().await?;
        tracing::debug!(url = %final_url, bytes = body.len(), "fetched page");
        Ok(body)
    }
}
