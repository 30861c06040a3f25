use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use repomon_common::types::DateRange;
use repomon_report::{CancelToken, EntityStatus, ReportPipeline, RunOptions};
use tracing::{error, info};

use crate::config::{ConfigError, DaemonConfig, ScheduleConfig};
use crate::subscriptions::FileSubscriptionStore;

/// Parse a `HH:MM` wall-clock time.
pub fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
    let invalid = || ConfigError::Invalid {
        reason: format!("schedule.time '{s}' is not a valid HH:MM time"),
    };
    let (hh, mm) = s.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hh.parse().map_err(|_| invalid())?;
    let minute: u32 = mm.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Decides when the periodic run fires: at the configured time of day, at
/// most once every `frequency_days` days.
pub struct Scheduler {
    at: NaiveTime,
    frequency_days: u64,
    last_run: Option<NaiveDate>,
    state_path: Option<PathBuf>,
}

impl Scheduler {
    pub fn new(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            at: parse_time(&config.time)?,
            frequency_days: config.frequency_days.max(1),
            last_run: None,
            state_path: None,
        })
    }

    /// Record the last-run date in `path` so a restart after the scheduled
    /// time does not re-fire a day whose run already happened.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.last_run = read_last_run(&path);
        self.state_path = Some(path);
        self
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        if now.time() < self.at {
            return false;
        }
        match self.last_run {
            None => true,
            Some(last) => (now.date() - last).num_days() >= self.frequency_days as i64,
        }
    }

    pub fn mark_ran(&mut self, date: NaiveDate) {
        self.last_run = Some(date);
        if let Some(path) = &self.state_path {
            if let Err(err) = std::fs::write(path, date.to_string()) {
                error!(path = %path.display(), error = %err, "cannot persist last-run date");
            }
        }
    }
}

fn read_last_run(path: &Path) -> Option<NaiveDate> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Window the run covers: `window_days` days ending on (and including)
/// the run day.
pub fn run_window(today: NaiveDate, window_days: u64) -> DateRange {
    DateRange::last_days(today + Days::new(1), window_days)
}

/// Tick loop driving scheduled runs until cancellation. Subscriptions are
/// re-read before every run so edits to the file take effect live.
pub async fn run_loop(
    pipeline: Arc<ReportPipeline>,
    subscriptions: FileSubscriptionStore,
    config: DaemonConfig,
    cancel: CancelToken,
) -> Result<(), ConfigError> {
    let mut scheduler = Scheduler::new(&config.schedule)?
        .with_state_file(config.storage.reports_dir.join(".last_run"));
    let mut tick = tokio::time::interval(Duration::from_secs(config.schedule.tick_secs.max(1)));
    info!(
        time = %config.schedule.time,
        frequency_days = config.schedule.frequency_days,
        "scheduler started"
    );

    loop {
        tick.tick().await;
        if cancel.is_cancelled() {
            info!("shutdown requested, scheduler stopping");
            return Ok(());
        }

        let now = Local::now().naive_local();
        if !scheduler.is_due(now) {
            continue;
        }

        let repos = match subscriptions.load() {
            Ok(repos) => repos,
            Err(err) => {
                // Skip this cycle rather than retrying every tick.
                error!(error = %err, "cannot load subscriptions, skipping run");
                scheduler.mark_ran(now.date());
                continue;
            }
        };

        let range = run_window(now.date(), config.run.window_days);
        let options = RunOptions {
            force: false,
            cancel: cancel.clone(),
            marker_ttl: Duration::from_secs(config.run.marker_ttl_secs),
        };

        info!(repos = repos.len(), range = %range, "scheduled run starting");
        match Arc::clone(&pipeline).run_all(&repos, range, &options).await {
            Ok(summary) => {
                let failed = summary
                    .outcomes
                    .iter()
                    .filter(|o| o.status == EntityStatus::Failed)
                    .count();
                info!(
                    total = summary.outcomes.len(),
                    failed,
                    consolidated = summary.consolidated_path.is_some(),
                    "scheduled run finished"
                );
            }
            Err(err) => error!(error = %err, "scheduled run failed"),
        }
        scheduler.mark_ran(now.date());
    }
}
