/// Errors that can occur within the export cache.
///
/// # Examples
///
/// ```rust
/// use repomon_cache::error::CacheError;
///
/// let err = CacheError::AlreadyCached {
///     key: "octo/demo 2024-01-01..2024-01-02".to_string(),
/// };
/// assert!(err.to_string().contains("octo/demo"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A snapshot already exists for this key and force-refresh was not set.
    /// Entries are write-once; supersession is an explicit caller decision.
    #[error("Cache: snapshot already cached for {key} (use force-refresh to supersede)")]
    AlreadyCached { key: String },

    /// Disk read/write failure. The previously visible snapshot for the
    /// key, if any, is untouched.
    #[error("Cache: persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// A cached file exists but could not be decoded.
    #[error("Cache: corrupt snapshot at {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Convenience `Result` alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
