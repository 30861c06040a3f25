use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repomon_ai::{substitute, Gateway, GenerateRequest, PromptResolver, ReportKind};
use repomon_cache::ExportCache;
use repomon_common::types::{
    DateRange, GenerationDecision, RepoId, Report, ReportOrigin, ReportSubject, Snapshot,
};
use repomon_notify::{Notification, Notifier};
use repomon_source::{ActivitySource, FetchFilters};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::render;
use crate::store::ReportStore;

const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(600);

/// Cooperative cancellation flag shared between a run and its driver.
/// Checked at step boundaries; a step already in flight finishes first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Bypass the idempotence short-circuit, refetch activity and
    /// supersede the cached snapshot.
    pub force: bool,
    pub cancel: CancelToken,
    /// Age after which a leftover in-progress marker is treated as stale.
    pub marker_ttl: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            cancel: CancelToken::new(),
            marker_ttl: DEFAULT_MARKER_TTL,
        }
    }
}

/// Outcome of one per-repository run.
#[derive(Debug)]
pub struct PipelineReport {
    pub repo: RepoId,
    pub range: DateRange,
    pub path: PathBuf,
    pub body: String,
    /// `None` when an already-stored report was reused as-is.
    pub origin: Option<ReportOrigin>,
    pub provider: Option<String>,
    pub reused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Done,
    Failed,
}

/// Per-entity result of a multi-repository run. One failed entity never
/// aborts the others.
#[derive(Debug)]
pub struct EntityOutcome {
    pub repo: RepoId,
    pub status: EntityStatus,
    pub report_path: Option<PathBuf>,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct RunSummary {
    /// Outcomes in the same order as the input repository list.
    pub outcomes: Vec<EntityOutcome>,
    pub consolidated_path: Option<PathBuf>,
}

/// Orchestrates one report run per (repository, interval) key:
/// cache-or-fetch, skip-or-generate, persist, notify.
pub struct ReportPipeline {
    source: Arc<dyn ActivitySource>,
    cache: ExportCache,
    gateway: Gateway,
    prompts: PromptResolver,
    store: ReportStore,
    notifier: Option<Arc<dyn Notifier>>,
    filters: FetchFilters,
    max_concurrent: usize,
    consolidate: bool,
}

impl ReportPipeline {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        cache: ExportCache,
        gateway: Gateway,
        prompts: PromptResolver,
        store: ReportStore,
    ) -> Self {
        Self {
            source,
            cache,
            gateway,
            prompts,
            store,
            notifier: None,
            filters: FetchFilters::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            consolidate: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_filters(mut self, filters: FetchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_consolidation(mut self, consolidate: bool) -> Self {
        self.consolidate = consolidate;
        self
    }

    /// Produce (or reuse) the report for one repository and interval.
    ///
    /// A warm cache entry with an already-stored report short-circuits the
    /// whole run: no source call, no generation, byte-identical output.
    pub async fn run(
        &self,
        repo: &RepoId,
        range: DateRange,
        options: &RunOptions,
    ) -> Result<PipelineReport> {
        if options.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let subject = ReportSubject::Repo(repo.clone());

        if !options.force && self.cache.get(repo, range)?.is_some() {
            if let Some(body) = self.store.load(&subject, range)? {
                info!(repo = %repo, range = %range, "cache warm and report present, reusing");
                return Ok(PipelineReport {
                    repo: repo.clone(),
                    range,
                    path: self.store.report_path(&subject, range),
                    body,
                    origin: None,
                    provider: None,
                    reused: true,
                });
            }
        }

        let _guard = self
            .cache
            .try_lock(repo, range, options.marker_ttl)?
            .ok_or_else(|| PipelineError::InProgress {
                key: format!("{repo} {range}"),
            })?;

        let snapshot = self.obtain_snapshot(repo, range, options.force).await?;

        if options.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let report = match GenerationDecision::from_snapshot(&snapshot) {
            GenerationDecision::SkipEmpty => {
                info!(repo = %repo, range = %range, "no activity in interval, skipping generation");
                Report {
                    subject: subject.clone(),
                    range,
                    body: render::no_activity_body(repo, range),
                    provider: None,
                    generated_at: Utc::now(),
                    origin: ReportOrigin::NoActivity,
                }
            }
            GenerationDecision::Generate => {
                let text = self.generate_body(&snapshot).await?;
                let generated_at = Utc::now();
                let provider = self.gateway.provider().to_string();
                let body = format!(
                    "{}{text}",
                    render::report_header(&subject, range, generated_at, &provider)
                );
                Report {
                    subject: subject.clone(),
                    range,
                    body,
                    provider: Some(provider),
                    generated_at,
                    origin: ReportOrigin::Generated,
                }
            }
        };

        let path = self.store.save(&report)?;
        self.notify(&report, &path);

        Ok(PipelineReport {
            repo: repo.clone(),
            range,
            path,
            body: report.body,
            origin: Some(report.origin),
            provider: report.provider,
            reused: false,
        })
    }

    /// Run every repository with bounded concurrency, then optionally
    /// write a consolidated report covering the whole run.
    pub async fn run_all(
        self: Arc<Self>,
        repos: &[RepoId],
        range: DateRange,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        if let Err(err) = self.gateway.health_check().await {
            warn!(
                provider = %self.gateway.provider(),
                error = %err,
                "backend unavailable, caching activity without generating"
            );
            return Ok(self.prefetch_all(repos, range, options, &err).await);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(repos.len());
        for repo in repos {
            let pipeline = Arc::clone(&self);
            let repo = repo.clone();
            let options = options.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (repo, Err(PipelineError::Cancelled));
                };
                let result = pipeline.run(&repo, range, &options).await;
                (repo, result)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut sections = Vec::new();
        let mut any_generated = false;
        let mut any_failed = false;

        for handle in handles {
            let (repo, result) = handle
                .await
                .map_err(|e| PipelineError::Persistence(std::io::Error::other(e)))?;
            match result {
                Ok(report) => {
                    any_generated |= match report.origin {
                        Some(ReportOrigin::Generated) => true,
                        Some(_) => false,
                        // Reused report: placeholder bodies are fixed text.
                        None => report.body != render::no_activity_body(&repo, range),
                    };
                    sections.push(report.body.clone());
                    outcomes.push(EntityOutcome {
                        repo,
                        status: EntityStatus::Done,
                        report_path: Some(report.path),
                        detail: None,
                    });
                }
                Err(err) => {
                    error!(repo = %repo, range = %range, error = %err, "entity run failed");
                    any_failed = true;
                    sections.push(render::failure_notice(&repo, range, &err.to_string()));
                    outcomes.push(EntityOutcome {
                        repo,
                        status: EntityStatus::Failed,
                        report_path: None,
                        detail: Some(err.to_string()),
                    });
                }
            }
        }

        let consolidated_path = if self.consolidate && !repos.is_empty() {
            Some(
                self.consolidate_run(range, &sections, any_generated, any_failed, options)
                    .await?,
            )
        } else {
            None
        };

        Ok(RunSummary {
            outcomes,
            consolidated_path,
        })
    }

    async fn obtain_snapshot(
        &self,
        repo: &RepoId,
        range: DateRange,
        force: bool,
    ) -> Result<Snapshot> {
        if !force {
            if let Some(snapshot) = self.cache.get(repo, range)? {
                return Ok(snapshot);
            }
        }
        let records = self.source.fetch(repo, range, self.filters).await?;
        Ok(self.cache.put(repo, range, records, force)?)
    }

    async fn generate_body(&self, snapshot: &Snapshot) -> Result<String> {
        let template = self.prompts.resolve(ReportKind::DailyReport);
        let mut vars = HashMap::new();
        vars.insert("repo", snapshot.repo.to_string());
        vars.insert("since", snapshot.range.since.to_string());
        vars.insert("until", snapshot.range.until.to_string());
        vars.insert("activity", render::activity_digest(snapshot));
        let prompt = substitute(&template, &vars);
        Ok(self.gateway.generate(&GenerateRequest::new("", prompt)).await?)
    }

    async fn consolidate_run(
        &self,
        range: DateRange,
        sections: &[String],
        any_generated: bool,
        any_failed: bool,
        options: &RunOptions,
    ) -> Result<PathBuf> {
        if options.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let report = if any_generated {
            let template = self.prompts.resolve(ReportKind::Consolidated);
            let mut vars = HashMap::new();
            vars.insert("since", range.since.to_string());
            vars.insert("until", range.until.to_string());
            vars.insert("reports", sections.join("\n---\n"));
            let prompt = substitute(&template, &vars);
            let text = self.gateway.generate(&GenerateRequest::new("", prompt)).await?;
            let generated_at = Utc::now();
            let provider = self.gateway.provider().to_string();
            let body = format!(
                "{}{text}",
                render::report_header(&ReportSubject::Consolidated, range, generated_at, &provider)
            );
            Report {
                subject: ReportSubject::Consolidated,
                range,
                body,
                provider: Some(provider),
                generated_at,
                origin: ReportOrigin::Generated,
            }
        } else {
            // Nothing worth sending to the backend.
            Report {
                subject: ReportSubject::Consolidated,
                range,
                body: render::consolidated_placeholder(range, sections),
                provider: None,
                generated_at: Utc::now(),
                origin: if any_failed {
                    ReportOrigin::FailureNotice
                } else {
                    ReportOrigin::NoActivity
                },
            }
        };

        let path = self.store.save(&report)?;
        self.notify(&report, &path);
        Ok(path)
    }

    async fn prefetch_all(
        &self,
        repos: &[RepoId],
        range: DateRange,
        options: &RunOptions,
        gateway_err: &repomon_ai::GatewayError,
    ) -> RunSummary {
        let mut outcomes = Vec::with_capacity(repos.len());
        for repo in repos {
            let detail = match self.prefetch(repo, range, options).await {
                Ok(()) => format!("activity cached, generation skipped: {gateway_err}"),
                Err(err) => err.to_string(),
            };
            outcomes.push(EntityOutcome {
                repo: repo.clone(),
                status: EntityStatus::Failed,
                report_path: None,
                detail: Some(detail),
            });
        }
        RunSummary {
            outcomes,
            consolidated_path: None,
        }
    }

    /// Cache-or-fetch without generating, used when the backend is down so
    /// the next healthy run starts from a warm cache.
    async fn prefetch(&self, repo: &RepoId, range: DateRange, options: &RunOptions) -> Result<()> {
        if options.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !options.force && self.cache.get(repo, range)?.is_some() {
            return Ok(());
        }
        let _guard = self
            .cache
            .try_lock(repo, range, options.marker_ttl)?
            .ok_or_else(|| PipelineError::InProgress {
                key: format!("{repo} {range}"),
            })?;
        let records = self.source.fetch(repo, range, self.filters).await?;
        self.cache.put(repo, range, records, options.force)?;
        Ok(())
    }

    fn notify(&self, report: &Report, path: &Path) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let notification = Notification::new(
            format!("Report ready: {} ({})", report.subject, report.range),
            preview(&report.body, 280).to_string(),
        )
        .with_report_path(path.display().to_string());

        // Fire and forget: delivery failures are logged, never propagated.
        tokio::spawn(async move {
            if let Err(err) = notifier.send(&notification).await {
                warn!(channel = notifier.name(), error = %err, "notification delivery failed");
            }
        });
    }
}

fn preview(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
