//! Single-run pipeline orchestration.
//!
//! One run walks Fetching → Extracting → Reconciling → Enriching →
//! Persisting. Failures before any record-level work (fetch, crawl job,
//! loading the persisted set) fail the whole run with zero side effects;
//! everything after that is isolated per record and accumulated as
//! diagnostics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use turnier_analyze::Analyzer;
use turnier_core::Candidate;
use turnier_scrape::{ExtractionOutcome, Extractor, PageProvider};
use turnier_store::{StoreError, TournamentStore};

use crate::reconcile::{reconcile, PlannedOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStage {
    Fetching,
    Extracting,
    Reconciling,
    Enriching,
    Persisting,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Fetching => "fetching",
            RunStage::Extracting => "extracting",
            RunStage::Reconciling => "reconciling",
            RunStage::Enriching => "enriching",
            RunStage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    Failed { stage: RunStage, message: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunCounts {
    pub blocks: usize,
    pub extracted: usize,
    pub skipped_blocks: usize,
    pub duplicates: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub enrichment_failures: usize,
    pub conflicts: usize,
    pub persist_failures: usize,
}

/// Per-record problem kept out of the run's control flow.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub stage: RunStage,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of asking for a run: either it ran, or another run was already
/// in progress and this tick was dropped.
#[derive(Debug)]
pub enum RunReport {
    Skipped,
    Finished(RunSummary),
}

pub struct Orchestrator {
    provider: Arc<dyn PageProvider>,
    store: Arc<dyn TournamentStore>,
    analyzer: Option<Arc<dyn Analyzer>>,
    target_url: String,
    shutdown: watch::Receiver<bool>,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn PageProvider>,
        store: Arc<dyn TournamentStore>,
        analyzer: Option<Arc<dyn Analyzer>>,
        target_url: String,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            provider,
            store,
            analyzer,
            target_url,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the pipeline once. Overlapping invocations are dropped, not
    /// queued: whoever holds the flag finishes, everyone else is skipped.
    pub async fn run_once(&self) -> RunReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("crawl already in progress, skipping this tick");
            return RunReport::Skipped;
        }
        let summary = self.execute().await;
        self.running.store(false, Ordering::SeqCst);
        RunReport::Finished(summary)
    }

    async fn execute(&self) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut counts = RunCounts::default();
        let mut diagnostics = Vec::new();
        let mut shutdown = self.shutdown.clone();

        tracing::info!(%run_id, url = %self.target_url, "starting crawl run");

        let fail = |stage: RunStage, message: String, counts: RunCounts, diagnostics| {
            tracing::warn!(%run_id, %stage, %message, "crawl run failed");
            RunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                status: RunStatus::Failed { stage, message },
                counts,
                diagnostics,
            }
        };

        let content = match self.provider.fetch(&self.target_url, &mut shutdown).await {
            Ok(content) => content,
            Err(err) => return fail(RunStage::Fetching, err.to_string(), counts, diagnostics),
        };

        let extractor = Extractor::new(started_at.year());
        let extraction = extractor.extract(&content);
        counts.blocks = extraction.block_count();
        let mut candidates: Vec<Candidate> = Vec::new();
        for outcome in extraction.outcomes() {
            match outcome {
                ExtractionOutcome::Candidate(candidate) => candidates.push(candidate),
                ExtractionOutcome::Skipped { line, reason } => {
                    counts.skipped_blocks += 1;
                    diagnostics.push(Diagnostic {
                        stage: RunStage::Extracting,
                        subject: line,
                        message: reason.to_string(),
                    });
                }
            }
        }
        counts.extracted = candidates.len();

        let persisted = match self.store.load_all().await {
            Ok(persisted) => persisted,
            Err(err) => return fail(RunStage::Reconciling, err.to_string(), counts, diagnostics),
        };
        let plan = reconcile(candidates, &persisted);
        counts.duplicates = plan.duplicates;
        counts.unchanged = plan.unchanged;

        for op in plan.ops {
            if *shutdown.borrow() {
                return fail(
                    RunStage::Persisting,
                    "run cancelled by shutdown".to_string(),
                    counts,
                    diagnostics,
                );
            }
            match op {
                PlannedOp::Insert(candidate) => {
                    let analysis = self
                        .enrich(&candidate, None, &mut counts, &mut diagnostics)
                        .await;
                    match self.store.insert(&candidate, analysis).await {
                        Ok(record) => {
                            counts.inserted += 1;
                            tracing::info!(name = %record.name, "inserted tournament");
                        }
                        Err(StoreError::Conflict) => {
                            // Another run already inserted this key; benign.
                            counts.conflicts += 1;
                            diagnostics.push(Diagnostic {
                                stage: RunStage::Persisting,
                                subject: candidate.name.clone(),
                                message: "identity key already stored".to_string(),
                            });
                        }
                        Err(err) => {
                            counts.persist_failures += 1;
                            diagnostics.push(Diagnostic {
                                stage: RunStage::Persisting,
                                subject: candidate.name.clone(),
                                message: err.to_string(),
                            });
                        }
                    }
                }
                PlannedOp::Update {
                    id,
                    candidate,
                    prior_analysis,
                } => {
                    let analysis = self
                        .enrich(&candidate, prior_analysis, &mut counts, &mut diagnostics)
                        .await;
                    match self.store.update(id, &candidate, analysis).await {
                        Ok(record) => {
                            counts.updated += 1;
                            tracing::info!(name = %record.name, "updated tournament");
                        }
                        Err(err) => {
                            counts.persist_failures += 1;
                            diagnostics.push(Diagnostic {
                                stage: RunStage::Persisting,
                                subject: candidate.name.clone(),
                                message: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let finished_at = Utc::now();
        tracing::info!(
            %run_id,
            inserted = counts.inserted,
            updated = counts.updated,
            unchanged = counts.unchanged,
            skipped_blocks = counts.skipped_blocks,
            enrichment_failures = counts.enrichment_failures,
            "crawl run completed"
        );
        RunSummary {
            run_id,
            started_at,
            finished_at,
            status: RunStatus::Completed,
            counts,
            diagnostics,
        }
    }

    /// Best-effort analysis. A failure keeps the prior value (absent on
    /// insert) and records a diagnostic; it never blocks persistence.
    async fn enrich(
        &self,
        candidate: &Candidate,
        prior: Option<String>,
        counts: &mut RunCounts,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<String> {
        let Some(analyzer) = &self.analyzer else {
            return prior;
        };
        match analyzer.analyze(candidate).await {
            Ok(text) => Some(text),
            Err(err) => {
                counts.enrichment_failures += 1;
                diagnostics.push(Diagnostic {
                    stage: RunStage::Enriching,
                    subject: candidate.name.clone(),
                    message: err.to_string(),
                });
                prior
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use turnier_analyze::AnalyzeError;
    use turnier_scrape::{CrawlJobClient, FetchError, JobService, JobStatus, PollConfig};
    use turnier_store::MemoryStore;

    const PAGE: &str = r#"
        <h2>Kalender 2025</h2>
        <h3>Juni</h3>
        <ul>
        <li>06.-08.06. Berliner Sommer Open</li>
        <li>Jugend-Cup Hamburg</li>
        <li>...</li>
        </ul>
    "#;

    struct StaticProvider(String);

    #[async_trait]
    impl PageProvider for StaticProvider {
        async fn fetch(
            &self,
            _url: &str,
            _shutdown: &mut watch::Receiver<bool>,
        ) -> Result<String, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl PageProvider for FailingProvider {
        async fn fetch(
            &self,
            _url: &str,
            _shutdown: &mut watch::Receiver<bool>,
        ) -> Result<String, FetchError> {
            Err(FetchError::HttpStatus {
                status: 503,
                url: "http://example.test".to_string(),
            })
        }
    }

    struct StuckJobService;

    #[async_trait]
    impl JobService for StuckJobService {
        async fn submit(&self, _url: &str) -> Result<String, FetchError> {
            Ok("job-1".to_string())
        }
        async fn status(&self, _job_id: &str) -> Result<JobStatus, FetchError> {
            Ok(JobStatus::Pending)
        }
        async fn result(&self, _job_id: &str) -> Result<String, FetchError> {
            unreachable!("stuck job never completes")
        }
    }

    struct StuckJobProvider(CrawlJobClient<StuckJobService>);

    #[async_trait]
    impl PageProvider for StuckJobProvider {
        async fn fetch(
            &self,
            url: &str,
            shutdown: &mut watch::Receiver<bool>,
        ) -> Result<String, FetchError> {
            self.0.fetch(url, shutdown).await
        }
    }

    struct GatedProvider {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl PageProvider for GatedProvider {
        async fn fetch(
            &self,
            _url: &str,
            _shutdown: &mut watch::Receiver<bool>,
        ) -> Result<String, FetchError> {
            self.release.notified().await;
            Ok("<p></p>".to_string())
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(&self, _candidate: &Candidate) -> Result<String, AnalyzeError> {
            Err(AnalyzeError::Api {
                status: 529,
                message: "overloaded".to_string(),
            })
        }
    }

    struct FixedAnalyzer(&'static str);

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn analyze(&self, _candidate: &Candidate) -> Result<String, AnalyzeError> {
            Ok(self.0.to_string())
        }
    }

    fn orchestrator(
        provider: Arc<dyn PageProvider>,
        store: Arc<dyn TournamentStore>,
        analyzer: Option<Arc<dyn Analyzer>>,
    ) -> (Orchestrator, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let orch =
            Orchestrator::new(provider, store, analyzer, "http://example.test".to_string(), rx);
        (orch, tx)
    }

    fn summary(report: RunReport) -> RunSummary {
        match report {
            RunReport::Finished(summary) => summary,
            RunReport::Skipped => panic!("run was skipped"),
        }
    }

    #[tokio::test]
    async fn second_run_over_identical_content_is_all_noops() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _shutdown) = orchestrator(
            Arc::new(StaticProvider(PAGE.to_string())),
            store.clone(),
            None,
        );

        let first = summary(orch.run_once().await);
        assert_eq!(first.status, RunStatus::Completed);
        assert_eq!(first.counts.inserted, 2);
        assert_eq!(first.counts.updated, 0);

        let second = summary(orch.run_once().await);
        assert_eq!(second.counts.inserted, 0);
        assert_eq!(second.counts.updated, 0);
        assert_eq!(second.counts.unchanged, 2);
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_run_with_zero_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _shutdown) = orchestrator(Arc::new(FailingProvider), store.clone(), None);

        let result = summary(orch.run_once().await);
        assert!(
            matches!(result.status, RunStatus::Failed { stage: RunStage::Fetching, .. })
        );
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn crawl_timeout_fails_the_run_and_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let client = CrawlJobClient::new(
            StuckJobService,
            PollConfig {
                interval: Duration::from_millis(5),
                max_wait: Duration::from_millis(25),
            },
        );
        let (orch, _shutdown) =
            orchestrator(Arc::new(StuckJobProvider(client)), store.clone(), None);

        let result = summary(orch.run_once().await);
        match result.status {
            RunStatus::Failed { stage, message } => {
                assert_eq!(stage, RunStage::Fetching);
                assert!(message.contains("still pending"), "message: {message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enrichment_failure_still_persists_structural_fields() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _shutdown) = orchestrator(
            Arc::new(StaticProvider(PAGE.to_string())),
            store.clone(),
            Some(Arc::new(FailingAnalyzer)),
        );

        let result = summary(orch.run_once().await);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.counts.inserted, 2);
        assert_eq!(result.counts.enrichment_failures, 2);

        let stored = store.load_all().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|t| t.analysis.is_none()));
    }

    #[tokio::test]
    async fn update_with_failed_enrichment_preserves_prior_analysis() {
        let store = Arc::new(MemoryStore::new());
        let (good, _shutdown_a) = orchestrator(
            Arc::new(StaticProvider(PAGE.to_string())),
            store.clone(),
            Some(Arc::new(FixedAnalyzer("solid summer open"))),
        );
        summary(good.run_once().await);

        // Same identity key, shifted dates: a descriptive change.
        let changed_page = PAGE.replace("06.-08.06.", "07.-09.06.");
        let (degraded, _shutdown_b) = orchestrator(
            Arc::new(StaticProvider(changed_page)),
            store.clone(),
            Some(Arc::new(FailingAnalyzer)),
        );
        let result = summary(degraded.run_once().await);
        assert_eq!(result.counts.updated, 1);
        assert_eq!(result.counts.enrichment_failures, 1);

        let stored = store.load_all().await.unwrap();
        let berlin = stored
            .iter()
            .find(|t| t.name.starts_with("Berliner"))
            .unwrap();
        assert_eq!(berlin.analysis.as_deref(), Some("solid summer open"));
        assert_eq!(
            berlin.start_date,
            chrono::NaiveDate::from_ymd_opt(2025, 6, 7)
        );
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped_not_queued() {
        let release = Arc::new(Notify::new());
        let store = Arc::new(MemoryStore::new());
        let (orch, _shutdown) = orchestrator(
            Arc::new(GatedProvider {
                release: release.clone(),
            }),
            store,
            None,
        );
        let orch = Arc::new(orch);

        let background = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run_once().await })
        };
        while !orch.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let second = orch.run_once().await;
        assert!(matches!(second, RunReport::Skipped));

        release.notify_one();
        let first = background.await.unwrap();
        assert!(matches!(first, RunReport::Finished(_)));
    }
}
