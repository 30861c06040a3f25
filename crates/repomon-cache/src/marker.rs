use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use repomon_common::types::{DateRange, RepoId};

use crate::error::Result;
use crate::ExportCache;

/// Advisory in-progress marker for one cache key, released on drop.
///
/// Prevents two overlapping runs (e.g. a manual trigger racing the
/// scheduler) from fetching and generating the same (repo, range) twice.
/// Single-process only; the marker carries a timestamp so a crashed run
/// cannot block the key past its TTL.
#[derive(Debug)]
pub struct RunGuard {
    path: PathBuf,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release run marker");
            }
        }
    }
}

impl ExportCache {
    fn marker_path(&self, repo: &RepoId, range: DateRange) -> PathBuf {
        self.root()
            .join(repo.dir_name())
            .join(format!("{}.lock", range.label()))
    }

    /// Try to acquire the in-progress marker for a key.
    ///
    /// Returns `None` when another run holds a live marker (acquired less
    /// than `ttl` ago). A stale marker is replaced.
    pub fn try_lock(&self, repo: &RepoId, range: DateRange, ttl: Duration) -> Result<Option<RunGuard>> {
        let path = self.marker_path(repo, range);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                write!(file, "{}", chrono::Utc::now().timestamp())?;
                Ok(Some(RunGuard { path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if marker_is_stale(&path, ttl) {
                    tracing::warn!(
                        repo = %repo,
                        range = %range,
                        "replacing stale run marker"
                    );
                    fs::write(&path, chrono::Utc::now().timestamp().to_string())?;
                    Ok(Some(RunGuard { path }))
                } else {
                    tracing::info!(repo = %repo, range = %range, "run already in progress, skipping");
                    Ok(None)
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn marker_is_stale(path: &PathBuf, ttl: Duration) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return true;
    };
    let Ok(acquired) = content.trim().parse::<i64>() else {
        return true;
    };
    let age = chrono::Utc::now().timestamp() - acquired;
    age >= ttl.as_secs() as i64
}
