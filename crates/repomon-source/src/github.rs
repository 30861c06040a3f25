use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use repomon_common::types::{ActivityKind, ActivityRecord, ActivityState, DateRange, RepoId};

use crate::error::{Result, SourceError};
use crate::{ActivitySource, FetchFilters};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// GitHub activity source: pages through issues and pull requests for a
/// repository and normalizes them into [`ActivityRecord`]s.
pub struct GithubSource {
    token: Option<String>,
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl GithubSource {
    pub fn new(token: Option<String>) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = backoff_base;
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("repomon"));
        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("token {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    /// One GET with rate-limit retry; see [`fetch_with_retry`].
    async fn get_json<T: DeserializeOwned>(
        &self,
        repo: &RepoId,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        fetch_with_retry(repo, self.max_retries, self.backoff_base, || {
            self.try_get(repo, url, query)
        })
        .await
    }

    async fn try_get<T: DeserializeOwned>(
        &self,
        repo: &RepoId,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .headers(self.headers())
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable {
                repo: repo.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let rate_exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "0")
                .unwrap_or(false);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(repo, status, rate_exhausted, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::MalformedResponse {
                repo: repo.to_string(),
                reason: e.to_string(),
            })
    }

    async fn fetch_issues(
        &self,
        repo: &RepoId,
        range: DateRange,
        filters: FetchFilters,
    ) -> Result<Vec<ActivityRecord>> {
        let url = format!("{}/repos/{}/issues", self.base_url, repo);
        let state = if filters.include_open { "all" } else { "closed" };
        let since = range
            .since
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().to_rfc3339())
            .unwrap_or_default();

        let items: Vec<IssueWire> = fetch_paged(
            |page| {
                let url = url.as_str();
                let query = vec![
                    ("state", state.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                    ("since", since.clone()),
                ];
                async move { self.get_json(repo, url, &query).await }
            },
            |_| false,
        )
        .await?;

        // The issues endpoint also lists pull requests; those carry a
        // pull_request key and are fetched separately.
        let records: Vec<ActivityRecord> = items
            .into_iter()
            .filter(|item| item.pull_request.is_none())
            .map(issue_to_record)
            .collect();

        tracing::debug!(repo = %repo, count = records.len(), "fetched issues");
        Ok(records)
    }

    async fn fetch_pulls(
        &self,
        repo: &RepoId,
        range: DateRange,
        filters: FetchFilters,
    ) -> Result<Vec<ActivityRecord>> {
        let url = format!("{}/repos/{}/pulls", self.base_url, repo);
        let state = if filters.include_open { "all" } else { "closed" };
        let since_bound = range
            .since
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);

        let items: Vec<PullWire> = fetch_paged(
            |page| {
                let url = url.as_str();
                let query = vec![
                    ("state", state.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                    ("sort", "created".to_string()),
                    ("direction", "desc".to_string()),
                ];
                async move { self.get_json(repo, url, &query).await }
            },
            |page| pulls_window_exhausted(page, since_bound),
        )
        .await?;

        let records: Vec<ActivityRecord> = items.into_iter().map(pull_to_record).collect();
        tracing::debug!(repo = %repo, count = records.len(), "fetched pull requests");
        Ok(records)
    }
}

/// Retries `attempt_fn` on `RateLimited` with bounded exponential backoff;
/// exhausting the budget collapses into `Unavailable`. Every other error,
/// authorization failures included, is returned as-is on the first attempt.
async fn fetch_with_retry<T, F, Fut>(
    repo: &RepoId,
    max_retries: u32,
    backoff_base: Duration,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn().await {
            Err(SourceError::RateLimited { .. }) if attempt < max_retries => {
                attempt += 1;
                let delay = backoff_delay(backoff_base, attempt);
                tracing::warn!(
                    repo = %repo,
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "GitHub rate limit hit, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(SourceError::RateLimited { repo }) => {
                return Err(SourceError::Unavailable {
                    repo,
                    reason: format!("rate limit budget exhausted after {attempt} retries"),
                });
            }
            other => return other,
        }
    }
}

/// Drives a paged listing: requests page 1, 2, ... and stops after the
/// first short page, or once `window_done` reports that a full page holds
/// nothing further inside the window.
async fn fetch_paged<T, F, Fut, D>(mut get_page: F, mut window_done: D) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<T>>>,
    D: FnMut(&[T]) -> bool,
{
    let mut all = Vec::new();
    let mut page = 1u32;
    loop {
        let items = get_page(page).await?;
        let page_len = items.len();
        let done = window_done(&items);
        all.extend(items);

        if page_len < PER_PAGE || done {
            return Ok(all);
        }
        page += 1;
    }
}

/// Pull pages arrive newest-first; once everything on a page was created
/// before the window there is nothing further back.
fn pulls_window_exhausted(page: &[PullWire], since_bound: DateTime<Utc>) -> bool {
    !page.is_empty() && page.iter().all(|p| p.created_at < since_bound)
}

#[async_trait::async_trait]
impl ActivitySource for GithubSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn fetch(
        &self,
        repo: &RepoId,
        range: DateRange,
        filters: FetchFilters,
    ) -> Result<Vec<ActivityRecord>> {
        tracing::info!(repo = %repo, range = %range, "fetching activity");

        let mut records = self.fetch_issues(repo, range, filters).await?;
        records.extend(self.fetch_pulls(repo, range, filters).await?);

        let records = filter_records(records, range, filters);
        tracing::info!(repo = %repo, count = records.len(), "activity fetched");
        Ok(records)
    }
}

// ---- wire types ----

#[derive(Debug, Deserialize)]
struct IssueWire {
    number: u64,
    title: String,
    state: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<String>,
    /// Present when the "issue" is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PullWire {
    number: u64,
    title: String,
    state: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<String>,
}

fn issue_to_record(item: IssueWire) -> ActivityRecord {
    let state = match item.state.as_str() {
        "closed" => ActivityState::Closed,
        _ => ActivityState::Open,
    };
    ActivityRecord {
        id: item.number,
        title: item.title,
        kind: ActivityKind::Issue,
        state,
        created_at: item.created_at,
        closed_at: item.closed_at,
        body: item.body.unwrap_or_default(),
    }
}

fn pull_to_record(item: PullWire) -> ActivityRecord {
    let state = if item.merged_at.is_some() {
        ActivityState::Merged
    } else {
        match item.state.as_str() {
            "closed" => ActivityState::Closed,
            _ => ActivityState::Open,
        }
    };
    ActivityRecord {
        id: item.number,
        title: item.title,
        kind: ActivityKind::PullRequest,
        state,
        created_at: item.created_at,
        closed_at: item.merged_at.or(item.closed_at),
        body: item.body.unwrap_or_default(),
    }
}

/// Server-side date filtering is inexact (GitHub's `since` compares
/// updated-at, `/pulls` has none at all), so the exact half-open interval
/// and the state filter are re-applied here. Output is ordered by
/// effective timestamp, then item number.
fn filter_records(
    records: Vec<ActivityRecord>,
    range: DateRange,
    filters: FetchFilters,
) -> Vec<ActivityRecord> {
    let mut records: Vec<ActivityRecord> = records
        .into_iter()
        .filter(|r| filters.accepts(r.state) && range.contains(r.effective_at()))
        .collect();
    records.sort_by_key(|r| (r.effective_at(), r.id));
    records
}

fn classify_status(
    repo: &RepoId,
    status: StatusCode,
    rate_exhausted: bool,
    body: &str,
) -> SourceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited {
            repo: repo.to_string(),
        },
        StatusCode::FORBIDDEN if rate_exhausted => SourceError::RateLimited {
            repo: repo.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Unavailable {
            repo: repo.to_string(),
            reason: "authorization failed, check GITHUB_TOKEN".to_string(),
        },
        _ => SourceError::Unavailable {
            repo: repo.to_string(),
            reason: format!("status={status}, body={}", truncate(body, 200)),
        },
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1 << (attempt - 1).min(6));
    let capped = exp.min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
    capped + Duration::from_millis(jitter_ms)
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range(since: (i32, u32, u32), until: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(since.0, since.1, since.2).unwrap(),
            NaiveDate::from_ymd_opt(until.0, until.1, until.2).unwrap(),
        )
        .unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn record(id: u64, state: ActivityState, closed_at: &str) -> ActivityRecord {
        ActivityRecord {
            id,
            title: format!("item {id}"),
            kind: ActivityKind::Issue,
            state,
            created_at: ts("2023-12-20T10:00:00Z"),
            closed_at: Some(ts(closed_at)),
            body: String::new(),
        }
    }

    #[test]
    fn filter_enforces_half_open_interval() {
        let r = range((2024, 1, 1), (2024, 1, 2));
        let records = vec![
            record(1, ActivityState::Closed, "2023-12-31T23:59:59Z"),
            record(2, ActivityState::Closed, "2024-01-01T00:00:00Z"),
            record(3, ActivityState::Closed, "2024-01-01T23:59:59Z"),
            record(4, ActivityState::Closed, "2024-01-02T00:00:00Z"),
        ];
        let kept = filter_records(records, r, FetchFilters::default());
        let ids: Vec<u64> = kept.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn filter_drops_open_items_by_default() {
        let r = range((2024, 1, 1), (2024, 1, 2));
        let mut open = record(5, ActivityState::Open, "2024-01-01T12:00:00Z");
        open.closed_at = None;
        open.created_at = ts("2024-01-01T12:00:00Z");
        let closed = record(6, ActivityState::Closed, "2024-01-01T12:00:00Z");

        let kept = filter_records(vec![open.clone(), closed], r, FetchFilters::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 6);

        let filters = FetchFilters { include_open: true };
        let kept = filter_records(vec![open], r, filters);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn filter_orders_by_effective_timestamp() {
        let r = range((2024, 1, 1), (2024, 1, 3));
        let records = vec![
            record(9, ActivityState::Closed, "2024-01-02T08:00:00Z"),
            record(3, ActivityState::Merged, "2024-01-01T08:00:00Z"),
        ];
        let kept = filter_records(records, r, FetchFilters::default());
        let ids: Vec<u64> = kept.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[test]
    fn merged_pull_maps_to_merged_state() {
        let wire = PullWire {
            number: 12,
            title: "add feature".to_string(),
            state: "closed".to_string(),
            created_at: ts("2024-01-01T09:00:00Z"),
            closed_at: Some(ts("2024-01-01T10:00:00Z")),
            merged_at: Some(ts("2024-01-01T10:00:00Z")),
            body: None,
        };
        let rec = pull_to_record(wire);
        assert_eq!(rec.kind, ActivityKind::PullRequest);
        assert_eq!(rec.state, ActivityState::Merged);
    }

    #[test]
    fn classify_distinguishes_rate_limit_from_auth() {
        let repo: RepoId = "octo/demo".parse().unwrap();

        let err = classify_status(&repo, StatusCode::TOO_MANY_REQUESTS, false, "");
        assert!(matches!(err, SourceError::RateLimited { .. }));

        let err = classify_status(&repo, StatusCode::FORBIDDEN, true, "");
        assert!(matches!(err, SourceError::RateLimited { .. }));

        let err = classify_status(&repo, StatusCode::FORBIDDEN, false, "bad credentials");
        assert!(matches!(err, SourceError::Unavailable { .. }));

        let err = classify_status(&repo, StatusCode::UNAUTHORIZED, false, "");
        match err {
            SourceError::Unavailable { reason, .. } => {
                assert!(reason.contains("GITHUB_TOKEN"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    fn rate_limited() -> SourceError {
        SourceError::RateLimited {
            repo: "octo/demo".to_string(),
        }
    }

    #[tokio::test]
    async fn exhausted_rate_limit_budget_collapses_into_unavailable() {
        let repo: RepoId = "octo/demo".parse().unwrap();
        let calls = std::cell::Cell::new(0u32);

        let result: Result<Vec<u64>> = fetch_with_retry(&repo, 2, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err(rate_limited()) }
        })
        .await;

        // Initial attempt plus both retries.
        assert_eq!(calls.get(), 3);
        match result {
            Err(SourceError::Unavailable { reason, .. }) => {
                assert!(reason.contains("rate limit budget exhausted after 2 retries"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_recovery_returns_the_payload() {
        let repo: RepoId = "octo/demo".parse().unwrap();
        let calls = std::cell::Cell::new(0u32);

        let result = fetch_with_retry(&repo, 3, Duration::ZERO, || {
            let n = calls.get() + 1;
            calls.set(n);
            async move {
                if n == 1 {
                    Err(rate_limited())
                } else {
                    Ok(vec![7u64])
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), vec![7]);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn auth_failures_are_not_retried() {
        let repo: RepoId = "octo/demo".parse().unwrap();
        let calls = std::cell::Cell::new(0u32);

        let result: Result<Vec<u64>> = fetch_with_retry(&repo, 3, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async {
                Err(SourceError::Unavailable {
                    repo: "octo/demo".to_string(),
                    reason: "authorization failed, check GITHUB_TOKEN".to_string(),
                })
            }
        })
        .await;

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn paging_stops_after_a_short_page() {
        let pages = std::cell::RefCell::new(vec![vec![1u64; PER_PAGE], vec![2u64; 3]]);
        let last_requested = std::cell::Cell::new(0u32);

        let items = fetch_paged(
            |page| {
                last_requested.set(page);
                let batch = pages.borrow_mut().remove(0);
                async move { Ok(batch) }
            },
            |_| false,
        )
        .await
        .unwrap();

        assert_eq!(last_requested.get(), 2);
        assert_eq!(items.len(), PER_PAGE + 3);
    }

    #[tokio::test]
    async fn paging_stops_once_the_window_is_exhausted() {
        // Full pages keep coming, but the predicate reports nothing further
        // inside the window after the first one.
        let last_requested = std::cell::Cell::new(0u32);

        let items = fetch_paged(
            |page| {
                last_requested.set(page);
                async move { Ok(vec![0u8; PER_PAGE]) }
            },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(last_requested.get(), 1);
        assert_eq!(items.len(), PER_PAGE);
    }

    #[test]
    fn full_page_of_older_pulls_exhausts_the_window() {
        let bound = ts("2024-01-01T00:00:00Z");
        let pull = |created: &str| PullWire {
            number: 1,
            title: "old".to_string(),
            state: "closed".to_string(),
            created_at: ts(created),
            closed_at: None,
            merged_at: None,
            body: None,
        };

        let older = vec![pull("2023-12-30T00:00:00Z"), pull("2023-12-31T00:00:00Z")];
        assert!(pulls_window_exhausted(&older, bound));

        let mixed = vec![pull("2023-12-30T00:00:00Z"), pull("2024-01-01T12:00:00Z")];
        assert!(!pulls_window_exhausted(&mixed, bound));

        // An empty page says nothing about the window.
        assert!(!pulls_window_exhausted(&[], bound));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_millis(500);
        let d1 = backoff_delay(base, 1);
        let d4 = backoff_delay(base, 4);
        assert!(d1 >= Duration::from_millis(500));
        assert!(d4 >= Duration::from_secs(4));
        assert!(backoff_delay(base, 10) <= MAX_BACKOFF + MAX_BACKOFF / 4);
    }
}
