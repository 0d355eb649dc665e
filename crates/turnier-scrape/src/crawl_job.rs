//! Client for the asynchronous crawl job service.
//!
//! The service renders JavaScript-heavy pages out of process: submit a job,
//! poll its status, retrieve the result once done. The poll loop sleeps for
//! the configured interval between checks, gives up after the maximum wait,
//! and can be interrupted by the shutdown channel at any point.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::fetch::{FetchConfig, FetchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
    Failed { message: String },
}

#[async_trait]
pub trait JobService: Send + Sync {
    async fn submit(&self, url: &str) -> Result<String, FetchError>;
    async fn status(&self, job_id: &str) -> Result<JobStatus, FetchError>;
    async fn result(&self, job_id: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    urls: &'a str,
    extract_html: bool,
    extract_text: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// HTTP implementation against a crawl4ai-style service:
/// `POST {base}/crawl` -> task id, `GET {base}/task/{id}` -> status + result.
pub struct HttpJobService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobService {
    pub fn new(base_url: String, config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .context("building crawl service client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn task(&self, job_id: &str) -> Result<TaskResponse, FetchError> {
        let url = format!("{}/task/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn submit(&self, url: &str) -> Result<String, FetchError> {
        let submit_url = format!("{}/crawl", self.base_url);
        let response = self
            .client
            .post(&submit_url)
            .json(&SubmitRequest {
                urls: url,
                extract_html: true,
                extract_text: true,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: submit_url,
            });
        }
        let body: SubmitResponse = response.json().await?;
        Ok(body.task_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, FetchError> {
        let task = self.task(job_id).await?;
        let status = match task.status.as_str() {
            "completed" => JobStatus::Done,
            "failed" => JobStatus::Failed {
                message: task.error.unwrap_or_else(|| "unspecified failure".to_string()),
            },
            _ => JobStatus::Pending,
        };
        Ok(status)
    }

    async fn result(&self, job_id: &str) -> Result<String, FetchError> {
        let task = self.task(job_id).await?;
        let content = task
            .result
            .and_then(|r| r.html.or(r.text))
            .filter(|c| !c.is_empty());
        content.ok_or_else(|| FetchError::CrawlJob("completed job returned no content".to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

/// Submit-then-poll fetch via a [`JobService`].
pub struct CrawlJobClient<S> {
    service: S,
    poll: PollConfig,
}

impl<S: JobService> CrawlJobClient<S> {
    pub fn new(service: S, poll: PollConfig) -> Self {
        Self { service, poll }
    }

    pub async fn fetch(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<String, FetchError> {
        let job_id = self.service.submit(url).await?;
        tracing::info!(job_id = %job_id, url, "crawl job submitted, polling for completion");

        let deadline = Instant::now() + self.poll.max_wait;
        loop {
            if *shutdown.borrow() {
                return Err(FetchError::Cancelled);
            }

            match self.service.status(&job_id).await? {
                JobStatus::Done => return self.service.result(&job_id).await,
                JobStatus::Failed { message } => {
                    tracing::warn!(job_id = %job_id, %message, "crawl job failed");
                    return Err(FetchError::CrawlJob(message));
                }
                JobStatus::Pending => {
                    tracing::debug!(job_id = %job_id, "crawl job still in progress");
                }
            }

            if Instant::now() + self.poll.interval >= deadline {
                return Err(FetchError::CrawlTimeout {
                    waited_secs: self.poll.max_wait.as_secs(),
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Err(FetchError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedService {
        pending_checks: usize,
        outcome: JobStatus,
        content: String,
        checks: AtomicUsize,
    }

    impl ScriptedService {
        fn new(pending_checks: usize, outcome: JobStatus, content: &str) -> Self {
            Self {
                pending_checks,
                outcome,
                content: content.to_string(),
                checks: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JobService for ScriptedService {
        async fn submit(&self, _url: &str) -> Result<String, FetchError> {
            Ok("job-1".to_string())
        }

        async fn status(&self, _job_id: &str) -> Result<JobStatus, FetchError> {
            let seen = self.checks.fetch_add(1, Ordering::SeqCst);
            if seen < self.pending_checks {
                Ok(JobStatus::Pending)
            } else {
                Ok(self.outcome.clone())
            }
        }

        async fn result(&self, _job_id: &str) -> Result<String, FetchError> {
            Ok(self.content.clone())
        }
    }

    fn quick_poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            max_wait: Duration::from_millis(40),
        }
    }

    #[tokio::test]
    async fn completes_after_a_few_pending_checks() {
        let client = CrawlJobClient::new(
            ScriptedService::new(2, JobStatus::Done, "<html>ok</html>"),
            quick_poll(),
        );
        let (_tx, mut rx) = watch::channel(false);
        let content = client.fetch("http://example.test", &mut rx).await.unwrap();
        assert_eq!(content, "<html>ok</html>");
    }

    #[tokio::test]
    async fn times_out_when_job_never_completes() {
        let client = CrawlJobClient::new(
            ScriptedService::new(usize::MAX, JobStatus::Done, ""),
            quick_poll(),
        );
        let (_tx, mut rx) = watch::channel(false);
        let err = client
            .fetch("http://example.test", &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::CrawlTimeout { .. }));
    }

    #[tokio::test]
    async fn surfaces_service_reported_failure() {
        let client = CrawlJobClient::new(
            ScriptedService::new(
                1,
                JobStatus::Failed {
                    message: "render crashed".to_string(),
                },
                "",
            ),
            quick_poll(),
        );
        let (_tx, mut rx) = watch::channel(false);
        let err = client
            .fetch("http://example.test", &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::CrawlJob(message) if message == "render crashed"));
    }

    #[tokio::test]
    async fn shutdown_interrupts_an_in_flight_poll_loop() {
        let client = CrawlJobClient::new(
            ScriptedService::new(usize::MAX, JobStatus::Done, ""),
            PollConfig {
                interval: Duration::from_secs(5),
                max_wait: Duration::from_secs(60),
            },
        );
        let (tx, mut rx) = watch::channel(false);
        let fetch = client.fetch("http://example.test", &mut rx);
        tokio::pin!(fetch);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            _ = &mut fetch => panic!("fetch finished before shutdown"),
        }
        tx.send(true).unwrap();

        let err = tokio::time::timeout(Duration::from_millis(200), fetch)
            .await
            .expect("fetch should return promptly after shutdown")
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
