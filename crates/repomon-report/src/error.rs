use repomon_ai::GatewayError;
use repomon_cache::error::CacheError;
use repomon_source::error::SourceError;

/// Errors surfaced by a report run.
///
/// # Examples
///
/// ```rust
/// use repomon_report::error::PipelineError;
///
/// let err = PipelineError::InProgress {
///     key: "octo/demo 2024-01-01..2024-01-02".to_string(),
/// };
/// assert!(err.to_string().contains("octo/demo"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Pipeline: failed to persist report: {0}")]
    Persistence(#[from] std::io::Error),

    /// Another run currently holds the in-progress marker for this key.
    #[error("Pipeline: a run for '{key}' is already in progress")]
    InProgress { key: String },

    /// The run observed a cancellation request and stopped early.
    #[error("Pipeline: run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
