pub mod error;
pub mod marker;


use std::fs;
use std::path::{Path, PathBuf};

use repomon_common::fingerprint;
use repomon_common::types::{ActivityRecord, DateRange, RepoId, Snapshot};

use error::{CacheError, Result};
pub use marker::RunGuard;

/// Stable cache key over (repo id, since, until).
pub fn cache_key(repo: &RepoId, range: DateRange) -> String {
    fingerprint::short_hash(format!("{repo}\n{}\n{}", range.since, range.until).as_bytes())
}

/// File-backed store of normalized activity snapshots.
///
/// Cache-first and write-once: `get` never triggers a fetch, and an entry
/// is only ever replaced through an explicit force-refresh, which
/// supersedes it atomically (write to temp, then rename) so a crash never
/// leaves a half-written snapshot visible.
pub struct ExportCache {
    root: PathBuf,
}

impl ExportCache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file for a key, derived deterministically from
    /// the repo id and the date bounds.
    pub fn snapshot_path(&self, repo: &RepoId, range: DateRange) -> PathBuf {
        self.root
            .join(repo.dir_name())
            .join(format!("{}.json", range.label()))
    }

    /// Look up a cached snapshot. Never fetches.
    pub fn get(&self, repo: &RepoId, range: DateRange) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(repo, range);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot = serde_json::from_slice(&data).map_err(|source| CacheError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!(repo = %repo, range = %range, key = %cache_key(repo, range), "cache hit");
        Ok(Some(snapshot))
    }

    /// Persist a snapshot for a key. Rejected when the key is already
    /// cached unless `force` is set, in which case the old entry is
    /// superseded atomically.
    pub fn put(
        &self,
        repo: &RepoId,
        range: DateRange,
        records: Vec<ActivityRecord>,
        force: bool,
    ) -> Result<Snapshot> {
        let path = self.snapshot_path(repo, range);
        if path.exists() && !force {
            return Err(CacheError::AlreadyCached {
                key: format!("{repo} {range}"),
            });
        }

        let snapshot = Snapshot::new(repo.clone(), range, records);
        let data = serde_json::to_vec_pretty(&snapshot).map_err(|source| CacheError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &path)?;

        tracing::info!(
            repo = %repo,
            range = %range,
            key = %cache_key(repo, range),
            records = snapshot.records.len(),
            superseded = force,
            "snapshot cached"
        );
        Ok(snapshot)
    }
}
