use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use repomon_ai::{Gateway, GatewayError, GenerateRequest, PromptResolver, TextGenerator};
use repomon_cache::ExportCache;
use repomon_common::types::{
    ActivityKind, ActivityRecord, ActivityState, DateRange, RepoId, ReportOrigin,
};
use repomon_source::error::SourceError;
use repomon_source::{ActivitySource, FetchFilters};

use crate::pipeline::{CancelToken, EntityStatus, ReportPipeline, RunOptions};
use crate::store::ReportStore;

struct ScriptedSource {
    records: HashMap<RepoId, Vec<ActivityRecord>>,
    failing: Vec<RepoId>,
    fetches: Arc<AtomicU32>,
}

#[async_trait]
impl ActivitySource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(
        &self,
        repo: &RepoId,
        _range: DateRange,
        _filters: FetchFilters,
    ) -> repomon_source::error::Result<Vec<ActivityRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(repo) {
            return Err(SourceError::Unavailable {
                repo: repo.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.records.get(repo).cloned().unwrap_or_default())
    }
}

/// Deterministic generator that reflects its prompt, so tests can assert
/// on what the pipeline fed it.
struct EchoGenerator {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    fn provider(&self) -> &str {
        "echo"
    }

    fn model_name(&self) -> &str {
        "echo-1"
    }

    async fn generate(&self, request: &GenerateRequest) -> repomon_ai::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("ECHO:{}", request.prompt))
    }

    async fn health_check(&self) -> repomon_ai::Result<()> {
        Ok(())
    }
}

struct DownGenerator {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl TextGenerator for DownGenerator {
    fn provider(&self) -> &str {
        "echo"
    }

    fn model_name(&self) -> &str {
        "echo-1"
    }

    async fn generate(&self, _request: &GenerateRequest) -> repomon_ai::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::ProviderUnavailable {
            provider: "echo".to_string(),
            remediation: "backend is down".to_string(),
        })
    }

    async fn health_check(&self) -> repomon_ai::Result<()> {
        Err(GatewayError::ProviderUnavailable {
            provider: "echo".to_string(),
            remediation: "backend is down".to_string(),
        })
    }
}

struct Harness {
    cache_dir: TempDir,
    report_dir: TempDir,
    pipeline: Arc<ReportPipeline>,
    fetches: Arc<AtomicU32>,
    generations: Arc<AtomicU32>,
}

fn harness_with(
    records: HashMap<RepoId, Vec<ActivityRecord>>,
    failing: Vec<RepoId>,
    consolidate: bool,
    generator: Box<dyn TextGenerator>,
) -> Harness {
    let cache_dir = TempDir::new().unwrap();
    let report_dir = TempDir::new().unwrap();
    let fetches = Arc::new(AtomicU32::new(0));

    let source = Arc::new(ScriptedSource {
        records,
        failing,
        fetches: fetches.clone(),
    });
    let cache = ExportCache::open(cache_dir.path()).unwrap();
    let store = ReportStore::open(report_dir.path()).unwrap();
    let gateway = Gateway::new(generator).with_retry_policy(0, Duration::from_millis(0));
    let prompts = PromptResolver::new(None, "echo");

    let pipeline = Arc::new(
        ReportPipeline::new(source, cache, gateway, prompts, store)
            .with_consolidation(consolidate),
    );

    Harness {
        cache_dir,
        report_dir,
        pipeline,
        fetches,
        generations: Arc::new(AtomicU32::new(0)),
    }
}

fn harness(
    records: HashMap<RepoId, Vec<ActivityRecord>>,
    failing: Vec<RepoId>,
    consolidate: bool,
) -> Harness {
    let generations = Arc::new(AtomicU32::new(0));
    let mut h = harness_with(
        records,
        failing,
        consolidate,
        Box::new(EchoGenerator {
            calls: generations.clone(),
        }),
    );
    h.generations = generations;
    h
}

fn range() -> DateRange {
    DateRange::single_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
}

fn repo(s: &str) -> RepoId {
    s.parse().unwrap()
}

fn closed_issue(id: u64, title: &str) -> ActivityRecord {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    ActivityRecord {
        id,
        title: title.to_string(),
        kind: ActivityKind::Issue,
        state: ActivityState::Closed,
        created_at: ts,
        closed_at: Some(ts),
        body: String::new(),
    }
}

fn one_repo_records(repo: &RepoId) -> HashMap<RepoId, Vec<ActivityRecord>> {
    let mut records = HashMap::new();
    records.insert(repo.clone(), vec![closed_issue(7, "fix crash")]);
    records
}

#[tokio::test]
async fn empty_interval_writes_placeholder_without_generation() {
    let h = harness(HashMap::new(), vec![], false);
    let repo = repo("octo/demo");

    let out = h.pipeline.run(&repo, range(), &RunOptions::default()).await.unwrap();

    assert_eq!(out.origin, Some(ReportOrigin::NoActivity));
    assert!(out.body.contains("No tracked activity"));
    assert!(out.path.exists());
    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.generations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn closed_issue_flows_into_the_prompt() {
    let repo = repo("octo/demo");
    let h = harness(one_repo_records(&repo), vec![], false);

    let out = h.pipeline.run(&repo, range(), &RunOptions::default()).await.unwrap();

    assert_eq!(out.origin, Some(ReportOrigin::Generated));
    assert_eq!(out.provider.as_deref(), Some("echo"));
    assert!(out.body.contains("## Issues"));
    assert!(out.body.contains("- [CLOSED] fix crash (#7)"));
    assert!(!out.body.contains("## Pull Requests"));
    assert!(out.body.contains("octo/demo"));
}

#[tokio::test]
async fn second_run_reuses_cache_and_report() {
    let repo = repo("octo/demo");
    let h = harness(one_repo_records(&repo), vec![], false);

    let first = h.pipeline.run(&repo, range(), &RunOptions::default()).await.unwrap();
    let second = h.pipeline.run(&repo, range(), &RunOptions::default()).await.unwrap();

    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(first.body, second.body);
    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.generations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn force_refetches_and_regenerates() {
    let repo = repo("octo/demo");
    let h = harness(one_repo_records(&repo), vec![], false);

    h.pipeline.run(&repo, range(), &RunOptions::default()).await.unwrap();
    let options = RunOptions {
        force: true,
        ..Default::default()
    };
    let forced = h.pipeline.run(&repo, range(), &options).await.unwrap();

    assert!(!forced.reused);
    assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(h.generations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancelled_run_touches_nothing() {
    let repo = repo("octo/demo");
    let h = harness(one_repo_records(&repo), vec![], false);

    let cancel = CancelToken::new();
    cancel.cancel();
    let options = RunOptions {
        cancel,
        ..Default::default()
    };

    let err = h.pipeline.run(&repo, range(), &options).await.unwrap_err();
    assert!(matches!(err, crate::error::PipelineError::Cancelled));
    assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_entity_does_not_abort_the_run() {
    let bad = repo("octo/broken");
    let good = repo("octo/demo");
    let h = harness(one_repo_records(&good), vec![bad.clone()], true);

    let summary = h
        .pipeline
        .clone()
        .run_all(&[bad.clone(), good.clone()], range(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.outcomes[0].repo, bad);
    assert_eq!(summary.outcomes[0].status, EntityStatus::Failed);
    assert!(summary.outcomes[0]
        .detail
        .as_deref()
        .unwrap()
        .contains("unavailable"));
    assert_eq!(summary.outcomes[1].status, EntityStatus::Done);

    // Consolidated report carries the failure notice alongside the good
    // repository's content.
    let consolidated = std::fs::read_to_string(summary.consolidated_path.unwrap()).unwrap();
    assert!(consolidated.contains("could not be processed"));
    assert!(consolidated.contains("fix crash"));
}

#[tokio::test]
async fn unhealthy_backend_still_caches_activity() {
    let repo_id = repo("octo/demo");
    let generations = Arc::new(AtomicU32::new(0));
    let h = harness_with(
        one_repo_records(&repo_id),
        vec![],
        true,
        Box::new(DownGenerator {
            calls: generations.clone(),
        }),
    );

    let summary = h
        .pipeline
        .clone()
        .run_all(&[repo_id.clone()], range(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.outcomes[0].status, EntityStatus::Failed);
    assert!(summary.outcomes[0]
        .detail
        .as_deref()
        .unwrap()
        .contains("activity cached"));
    assert!(summary.consolidated_path.is_none());
    assert_eq!(generations.load(Ordering::SeqCst), 0);

    // Snapshot landed in the cache so a later healthy run can skip the fetch.
    let snapshot = h
        .cache_dir
        .path()
        .join("octo_demo")
        .join("2024-01-01_2024-01-02.json");
    assert!(snapshot.exists());
    // No report was written.
    assert!(!h.report_dir.path().join("octo_demo").exists());
}

#[tokio::test]
async fn all_empty_run_consolidates_without_generation() {
    let a = repo("octo/alpha");
    let b = repo("octo/beta");
    let h = harness(HashMap::new(), vec![], true);

    let summary = h
        .pipeline
        .clone()
        .run_all(&[a, b], range(), &RunOptions::default())
        .await
        .unwrap();

    assert!(summary.outcomes.iter().all(|o| o.status == EntityStatus::Done));
    assert_eq!(h.generations.load(Ordering::SeqCst), 0);

    let consolidated = std::fs::read_to_string(summary.consolidated_path.unwrap()).unwrap();
    assert!(consolidated.contains("No tracked activity"));
}
