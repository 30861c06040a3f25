/// Errors that can occur while fetching activity from the source API.
///
/// # Examples
///
/// ```rust
/// use repomon_source::error::SourceError;
///
/// let err = SourceError::Unavailable {
///     repo: "octo/demo".to_string(),
///     reason: "connection refused".to_string(),
/// };
/// assert!(err.to_string().contains("octo/demo"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached or refused the request (network
    /// failure, server error, or bad credentials). Not retried once raised;
    /// authorization failures in particular are never retried.
    #[error("Source: {repo} unavailable: {reason}")]
    Unavailable { repo: String, reason: String },

    /// The source signalled an explicit rate limit. Retried with bounded
    /// backoff; exhausting the budget collapses into `Unavailable`.
    #[error("Source: rate limited while fetching {repo}")]
    RateLimited { repo: String },

    /// The response payload could not be decoded.
    #[error("Source: malformed response for {repo}: {reason}")]
    MalformedResponse { repo: String, reason: String },
}

/// Convenience `Result` alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
