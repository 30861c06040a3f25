/// Errors raised when delivering a notification.
///
/// # Examples
///
/// ```rust
/// use repomon_notify::error::NotifyError;
///
/// let err = NotifyError::Delivery {
///     channel: "webhook".to_string(),
///     reason: "connection refused".to_string(),
/// };
/// assert!(err.to_string().contains("webhook"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The channel endpoint rejected or never received the message.
    #[error("Notify: delivery via '{channel}' failed: {reason}")]
    Delivery { channel: String, reason: String },

    /// The channel is not configured (for example a missing webhook URL).
    #[error("Notify: channel '{channel}' is not configured: {reason}")]
    NotConfigured { channel: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;
