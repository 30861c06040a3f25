/// Errors that can occur while calling a text-generation backend.
///
/// # Examples
///
/// ```rust
/// use repomon_ai::error::GatewayError;
///
/// let err = GatewayError::ProviderUnavailable {
///     provider: "ollama".to_string(),
///     remediation: "start the service with `ollama serve`".to_string(),
/// };
/// assert!(err.to_string().contains("ollama"));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The backend is unreachable or its retry budget is exhausted. The
    /// message names the provider and a concrete remediation step, since
    /// retrying cannot fix misconfiguration.
    #[error("Gateway: provider '{provider}' unavailable. Remediation: {remediation}")]
    ProviderUnavailable {
        provider: String,
        remediation: String,
    },

    /// Missing or invalid credential. Never retried.
    #[error("Gateway: authentication failed for provider '{provider}'. Remediation: {remediation}")]
    Auth {
        provider: String,
        remediation: String,
    },

    /// Transient backend failure (5xx, timeout, rate limit). Retried with
    /// bounded backoff; on exhaustion re-raised as `ProviderUnavailable`.
    #[error("Gateway: upstream error from '{provider}': {detail}")]
    Upstream { provider: String, detail: String },

    /// The backend rejected the request (4xx other than auth/rate-limit).
    /// Never retried.
    #[error("Gateway: '{provider}' rejected the request: status={status}, body={body}")]
    InvalidRequest {
        provider: String,
        status: u16,
        body: String,
    },

    /// The backend answered 2xx but the payload had no usable completion.
    #[error("Gateway: invalid response from '{provider}': {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::ProviderUnavailable { provider, .. }
            | Self::Auth { provider, .. }
            | Self::Upstream { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::InvalidResponse { provider, .. } => provider,
        }
    }
}

/// Convenience `Result` alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
