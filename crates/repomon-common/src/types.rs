use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint;

/// Identifier of one monitored repository in `owner/name` form.
///
/// # Examples
///
/// ```
/// use repomon_common::types::RepoId;
///
/// let id: RepoId = "octo/demo".parse().unwrap();
/// assert_eq!(id.owner(), "octo");
/// assert_eq!(id.name(), "demo");
/// assert_eq!(id.to_string(), "octo/demo");
/// assert!("not-a-repo".parse::<RepoId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or("")
    }

    /// Filesystem-safe form: `owner_name`.
    pub fn dir_name(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid repository id '{0}', expected 'owner/name'")]
pub struct ParseRepoIdError(String);

impl std::str::FromStr for RepoId {
    type Err = ParseRepoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(RepoId(s.to_string()))
            }
            _ => Err(ParseRepoIdError(s.to_string())),
        }
    }
}

/// Half-open date interval `[since, until)`.
///
/// A single day is expressed as `since..since + 1 day`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use repomon_common::types::DateRange;
///
/// let since = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let until = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
/// let range = DateRange::new(since, until).unwrap();
/// assert_eq!(range.days(), 1);
/// assert!(DateRange::new(until, since).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
#[error("empty date range: until ({until}) must be after since ({since})")]
pub struct EmptyRangeError {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateRange {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Result<Self, EmptyRangeError> {
        if until <= since {
            return Err(EmptyRangeError { since, until });
        }
        Ok(Self { since, until })
    }

    /// The single day `date`.
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            since: date,
            until: date + chrono::Days::new(1),
        }
    }

    /// The `days`-long window ending at `until` (exclusive).
    pub fn last_days(until: NaiveDate, days: u64) -> Self {
        Self {
            since: until - chrono::Days::new(days.max(1)),
            until,
        }
    }

    pub fn days(&self) -> i64 {
        (self.until - self.since).num_days()
    }

    /// Whether `ts` falls inside the half-open interval.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let date = ts.date_naive();
        date >= self.since && date < self.until
    }

    /// Filesystem-safe label: `2024-01-01_2024-01-02`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.since, self.until)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.since, self.until)
    }
}

/// Kind of activity item tracked by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Issue,
    PullRequest,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::PullRequest => "pull_request",
        }
    }
}

/// Lifecycle state of an activity item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Open,
    Closed,
    Merged,
}

impl ActivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }

    /// Whether the item has reached a resolved state.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Closed | Self::Merged)
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of monitored activity, normalized from the source API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Item number within the repository (`#42`).
    pub id: u64,
    pub title: String,
    pub kind: ActivityKind,
    pub state: ActivityState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Free-text body, may be empty.
    #[serde(default)]
    pub body: String,
}

impl ActivityRecord {
    /// Timestamp used for interval filtering: resolution time when present,
    /// creation time otherwise.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.closed_at.unwrap_or(self.created_at)
    }
}

/// Cached, normalized activity for one repository over one date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub repo: RepoId,
    pub range: DateRange,
    pub records: Vec<ActivityRecord>,
    /// Content fingerprint over (repo, range, record ids and states).
    pub fingerprint: String,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(repo: RepoId, range: DateRange, records: Vec<ActivityRecord>) -> Self {
        let fingerprint = Self::fingerprint_of(&repo, range, &records);
        Self {
            repo,
            range,
            records,
            fingerprint,
            fetched_at: Utc::now(),
        }
    }

    pub fn fingerprint_of(repo: &RepoId, range: DateRange, records: &[ActivityRecord]) -> String {
        let mut buf = format!("{repo}\n{range}\n");
        for record in records {
            buf.push_str(&format!(
                "{}:{}:{}\n",
                record.kind.as_str(),
                record.id,
                record.state
            ));
        }
        fingerprint::sha256_hex(buf.as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What a report covers: one repository, or the whole run merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSubject {
    Repo(RepoId),
    Consolidated,
}

impl std::fmt::Display for ReportSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(repo) => write!(f, "{repo}"),
            Self::Consolidated => f.write_str("consolidated"),
        }
    }
}

/// How a report body came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOrigin {
    /// Synthesized by a model backend. Only set after a successful
    /// gateway call for this key.
    Generated,
    /// Fixed placeholder written without invoking any backend.
    NoActivity,
    /// Failure notice embedded in a consolidated report.
    FailureNotice,
}

/// Synthesized narrative report, or a no-activity placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub subject: ReportSubject,
    pub range: DateRange,
    pub body: String,
    /// Provider that generated the body; `None` for placeholders.
    pub provider: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub origin: ReportOrigin,
}

/// Transient per-run decision derived from snapshot size. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationDecision {
    Generate,
    SkipEmpty,
}

impl GenerationDecision {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        if snapshot.is_empty() {
            Self::SkipEmpty
        } else {
            Self::Generate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn repo_id_parses_owner_and_name() {
        let id: RepoId = "rust-lang/rust".parse().unwrap();
        assert_eq!(id.owner(), "rust-lang");
        assert_eq!(id.name(), "rust");
        assert_eq!(id.dir_name(), "rust-lang_rust");
    }

    #[test]
    fn repo_id_rejects_malformed_input() {
        assert!("".parse::<RepoId>().is_err());
        assert!("norepo".parse::<RepoId>().is_err());
        assert!("a/b/c".parse::<RepoId>().is_err());
        assert!("/name".parse::<RepoId>().is_err());
        assert!("owner/".parse::<RepoId>().is_err());
    }

    #[test]
    fn date_range_is_half_open() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();
        let inside = "2024-01-02T23:59:59Z".parse::<DateTime<Utc>>().unwrap();
        let at_until = "2024-01-03T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert!(range.contains(inside));
        assert!(!range.contains(at_until));
        assert_eq!(range.days(), 2);
    }

    #[test]
    fn date_range_rejects_empty() {
        assert!(DateRange::new(date(2024, 1, 2), date(2024, 1, 2)).is_err());
        assert!(DateRange::new(date(2024, 1, 2), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn single_day_spans_one_day() {
        let range = DateRange::single_day(date(2024, 1, 1));
        assert_eq!(range.until, date(2024, 1, 2));
        assert_eq!(range.days(), 1);
    }

    #[test]
    fn fingerprint_depends_on_records() {
        let repo: RepoId = "octo/demo".parse().unwrap();
        let range = DateRange::single_day(date(2024, 1, 1));
        let record = ActivityRecord {
            id: 7,
            title: "fix crash".to_string(),
            kind: ActivityKind::Issue,
            state: ActivityState::Closed,
            created_at: Utc::now(),
            closed_at: Some(Utc::now()),
            body: String::new(),
        };

        let empty = Snapshot::new(repo.clone(), range, vec![]);
        let full = Snapshot::new(repo.clone(), range, vec![record.clone()]);
        let full_again = Snapshot::new(repo, range, vec![record]);

        assert_ne!(empty.fingerprint, full.fingerprint);
        assert_eq!(full.fingerprint, full_again.fingerprint);
    }

    #[test]
    fn decision_skips_empty_snapshots() {
        let repo: RepoId = "octo/demo".parse().unwrap();
        let range = DateRange::single_day(date(2024, 1, 1));
        let snapshot = Snapshot::new(repo, range, vec![]);
        assert_eq!(
            GenerationDecision::from_snapshot(&snapshot),
            GenerationDecision::SkipEmpty
        );
    }
}
