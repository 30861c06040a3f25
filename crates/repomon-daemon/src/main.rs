use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use repomon_ai::{Gateway, PromptResolver};
use repomon_cache::ExportCache;
use repomon_common::types::RepoId;
use repomon_daemon::config::DaemonConfig;
use repomon_daemon::scheduler::{run_loop, run_window};
use repomon_daemon::subscriptions::FileSubscriptionStore;
use repomon_notify::WebhookNotifier;
use repomon_report::{CancelToken, EntityStatus, ReportPipeline, ReportStore, RunOptions};
use repomon_source::{FetchFilters, GithubSource};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("repomon=info,warn")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("run-once") => {
            let Some(config_path) = args.next() else {
                print_usage();
                anyhow::bail!("run-once requires a config path");
            };
            let mut repo: Option<RepoId> = None;
            let mut force = false;
            for arg in args {
                if arg == "--force" {
                    force = true;
                } else {
                    repo = Some(arg.parse().context("parsing repository argument")?);
                }
            }
            run_once(&config_path, repo, force).await
        }
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        path => {
            let path = path.map(str::to_string).unwrap_or_else(|| "config.toml".to_string());
            run_daemon(&path).await
        }
    }
}

fn print_usage() {
    eprintln!(
        "usage:\n  \
         repomon-daemon [config.toml]                        start the scheduler\n  \
         repomon-daemon run-once <config.toml> [owner/name] [--force]\n  \
         \n  \
         run-once processes the subscription list (or a single repository)\n  \
         for the current window and exits; --force refetches activity and\n  \
         regenerates reports that already exist."
    );
}

async fn run_daemon(config_path: &str) -> anyhow::Result<()> {
    let config = DaemonConfig::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let pipeline = build_pipeline(&config)?;
    let subscriptions = FileSubscriptionStore::new(&config.storage.subscriptions_file);

    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing the current step then exiting");
            signal_cancel.cancel();
        }
    });

    info!(config = %config_path, "daemon starting");
    run_loop(pipeline, subscriptions, config, cancel).await?;
    Ok(())
}

async fn run_once(config_path: &str, repo: Option<RepoId>, force: bool) -> anyhow::Result<()> {
    let config = DaemonConfig::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let pipeline = build_pipeline(&config)?;
    let range = run_window(Local::now().date_naive(), config.run.window_days);
    let options = RunOptions {
        force,
        cancel: CancelToken::new(),
        marker_ttl: Duration::from_secs(config.run.marker_ttl_secs),
    };

    match repo {
        Some(repo) => {
            let report = pipeline.run(&repo, range, &options).await?;
            info!(
                repo = %report.repo,
                path = %report.path.display(),
                reused = report.reused,
                "report ready"
            );
        }
        None => {
            let repos = FileSubscriptionStore::new(&config.storage.subscriptions_file).load()?;
            let summary = pipeline.run_all(&repos, range, &options).await?;
            for outcome in &summary.outcomes {
                match outcome.status {
                    EntityStatus::Done => info!(
                        repo = %outcome.repo,
                        path = %outcome
                            .report_path
                            .as_deref()
                            .unwrap_or_else(|| std::path::Path::new(""))
                            .display(),
                        "report ready"
                    ),
                    EntityStatus::Failed => warn!(
                        repo = %outcome.repo,
                        detail = outcome.detail.as_deref().unwrap_or("unknown"),
                        "repository failed"
                    ),
                }
            }
            if let Some(path) = summary.consolidated_path {
                info!(path = %path.display(), "consolidated report ready");
            }
        }
    }
    Ok(())
}

fn build_pipeline(config: &DaemonConfig) -> anyhow::Result<Arc<ReportPipeline>> {
    let token = config.github_token();
    if token.is_none() {
        warn!(
            env = %config.github.token_env,
            "no access token set, source requests are unauthenticated and tightly rate limited"
        );
    }
    let source = GithubSource::new(token)
        .context("building source client")?
        .with_base_url(config.github.api_url.clone());

    let cache = ExportCache::open(&config.storage.cache_dir)?;
    let store = ReportStore::open(&config.storage.reports_dir)?;
    let gateway = Gateway::from_config(&config.provider_config())?.with_retry_policy(
        config.llm.retry_attempts,
        Duration::from_millis(config.llm.retry_base_ms),
    );
    let prompts = PromptResolver::new(config.storage.prompts_dir.clone(), &config.llm.provider);

    let mut pipeline = ReportPipeline::new(Arc::new(source), cache, gateway, prompts, store)
        .with_filters(FetchFilters {
            include_open: config.github.include_open,
        })
        .with_max_concurrent(config.run.max_concurrent)
        .with_consolidation(config.run.enable_consolidated);

    if let Some(url) = &config.notify.webhook_url {
        let notifier = WebhookNotifier::new(url).context("building webhook client")?;
        pipeline = pipeline.with_notifier(Arc::new(notifier));
    }
    Ok(Arc::new(pipeline))
}
