pub mod error;
pub mod github;

use async_trait::async_trait;
use repomon_common::types::{ActivityRecord, ActivityState, DateRange, RepoId};

pub use error::SourceError;
pub use github::GithubSource;

/// State filters applied to fetched activity.
///
/// The default restricts to resolved items (closed issues, merged or closed
/// pull requests), which is what progress reports summarize.
#[derive(Debug, Clone, Copy)]
pub struct FetchFilters {
    pub include_open: bool,
}

impl Default for FetchFilters {
    fn default() -> Self {
        Self {
            include_open: false,
        }
    }
}

impl FetchFilters {
    pub fn accepts(&self, state: ActivityState) -> bool {
        self.include_open || state.is_resolved()
    }
}

/// Retrieves raw activity items for a repository over a date range.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Source name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Fetch all activity for `repo` within the half-open interval `range`,
    /// page by page, until the source reports no further pages. Results are
    /// ordered and filtered client-side to the exact interval, since the
    /// API's own date filtering is inexact.
    async fn fetch(
        &self,
        repo: &RepoId,
        range: DateRange,
        filters: FetchFilters,
    ) -> error::Result<Vec<ActivityRecord>>;
}
