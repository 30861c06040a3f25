use std::path::{Path, PathBuf};

use repomon_common::types::RepoId;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscriptions: cannot read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Subscriptions: cannot parse '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Subscriptions: invalid entry in '{path}': {source}")]
    InvalidRepo {
        path: String,
        source: repomon_common::types::ParseRepoIdError,
    },
}

/// Reads the subscribed repository list from a JSON file, preserving the
/// file's order. The file is re-read before every scheduled run so edits
/// take effect without a restart.
pub struct FileSubscriptionStore {
    path: PathBuf,
}

impl FileSubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<RepoId>, SubscriptionError> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|source| SubscriptionError::Read {
                path: self.path.display().to_string(),
                source,
            })?;
        let entries: Vec<String> =
            serde_json::from_str(&text).map_err(|source| SubscriptionError::Parse {
                path: self.path.display().to_string(),
                source,
            })?;

        let mut repos = Vec::with_capacity(entries.len());
        for entry in entries {
            let repo = entry
                .parse::<RepoId>()
                .map_err(|source| SubscriptionError::InvalidRepo {
                    path: self.path.display().to_string(),
                    source,
                })?;
            // First occurrence wins.
            if !repos.contains(&repo) {
                repos.push(repo);
            }
        }
        debug!(path = %self.path.display(), count = repos.len(), "subscriptions loaded");
        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store_with(content: &str) -> (TempDir, FileSubscriptionStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subscriptions.json");
        std::fs::write(&path, content).unwrap();
        (dir, FileSubscriptionStore::new(path))
    }

    #[test]
    fn load_preserves_file_order() {
        let (_dir, store) = store_with(r#"["octo/zulu", "octo/alpha"]"#);
        let repos = store.load().unwrap();
        assert_eq!(repos[0].to_string(), "octo/zulu");
        assert_eq!(repos[1].to_string(), "octo/alpha");
    }

    #[test]
    fn load_drops_duplicates() {
        let (_dir, store) = store_with(r#"["octo/demo", "octo/demo", "octo/other"]"#);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn invalid_entry_is_an_error() {
        let (_dir, store) = store_with(r#"["not-a-repo"]"#);
        assert!(matches!(
            store.load().unwrap_err(),
            SubscriptionError::InvalidRepo { .. }
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let store = FileSubscriptionStore::new("/nonexistent/subscriptions.json");
        assert!(matches!(
            store.load().unwrap_err(),
            SubscriptionError::Read { .. }
        ));
    }
}
