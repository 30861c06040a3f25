use std::fs;
use std::path::{Path, PathBuf};

use repomon_common::types::{DateRange, Report, ReportSubject};
use tracing::info;

use crate::error::Result;

/// File-backed store of finished markdown reports, laid out the same way
/// as the snapshot cache so a report and its snapshot are easy to pair up.
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path for a report key.
    pub fn report_path(&self, subject: &ReportSubject, range: DateRange) -> PathBuf {
        let dir = match subject {
            ReportSubject::Repo(repo) => repo.dir_name(),
            ReportSubject::Consolidated => "consolidated".to_string(),
        };
        self.root
            .join(dir)
            .join(format!("{}_report.md", range.label()))
    }

    /// Read a stored report body, if one exists for the key.
    pub fn load(&self, subject: &ReportSubject, range: DateRange) -> Result<Option<String>> {
        match fs::read_to_string(self.report_path(subject, range)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a report body atomically (write to temp, then rename).
    pub fn save(&self, report: &Report) -> Result<PathBuf> {
        let path = self.report_path(&report.subject, report.range);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, report.body.as_bytes())?;
        fs::rename(&tmp, &path)?;

        info!(
            subject = %report.subject,
            range = %report.range,
            origin = ?report.origin,
            path = %path.display(),
            "report stored"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use repomon_common::types::{RepoId, ReportOrigin};
    use tempfile::TempDir;

    use super::*;

    fn range() -> DateRange {
        DateRange::single_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::open(dir.path()).unwrap();
        let repo: RepoId = "octo/demo".parse().unwrap();
        let subject = ReportSubject::Repo(repo);

        let report = Report {
            subject: subject.clone(),
            range: range(),
            body: "# Progress\n".to_string(),
            provider: Some("ollama".to_string()),
            generated_at: Utc::now(),
            origin: ReportOrigin::Generated,
        };

        let path = store.save(&report).unwrap();
        assert!(path.ends_with("octo_demo/2024-01-01_2024-01-02_report.md"));
        assert_eq!(store.load(&subject, range()).unwrap().unwrap(), "# Progress\n");
        assert!(!path.with_extension("md.tmp").exists());
    }

    #[test]
    fn consolidated_reports_live_under_their_own_dir() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::open(dir.path()).unwrap();
        let path = store.report_path(&ReportSubject::Consolidated, range());
        assert!(path.ends_with("consolidated/2024-01-01_2024-01-02_report.md"));
    }

    #[test]
    fn load_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::open(dir.path()).unwrap();
        let repo: RepoId = "octo/demo".parse().unwrap();
        assert!(store.load(&ReportSubject::Repo(repo), range()).unwrap().is_none());
    }
}
