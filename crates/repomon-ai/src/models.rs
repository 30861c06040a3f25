use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// OpenAI-style chat completion request, shared by the hosted providers.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatResponse {
    pub fn content(self, provider: &str) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::InvalidResponse {
                provider: provider.to_string(),
                reason: "empty choices array".to_string(),
            })
    }
}

/// Classify a non-success HTTP response from a backend.
///
/// 401/403 is an auth failure (never retried), 429 and 5xx are transient
/// upstream errors (retryable), any other 4xx is a request error (never
/// retried).
pub(crate) fn classify_status(
    provider: &str,
    remediation: &str,
    status: u16,
    body: &str,
) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Auth {
            provider: provider.to_string(),
            remediation: remediation.to_string(),
        },
        429 => GatewayError::Upstream {
            provider: provider.to_string(),
            detail: "rate limited (status 429)".to_string(),
        },
        500..=599 => GatewayError::Upstream {
            provider: provider.to_string(),
            detail: format!("status={status}, body={}", truncate(body, 200)),
        },
        _ => GatewayError::InvalidRequest {
            provider: provider.to_string(),
            status,
            body: truncate(body, 200).to_string(),
        },
    }
}

/// Map a transport-level failure. Timeouts and connection errors are
/// transient and therefore retryable.
pub(crate) fn classify_transport(provider: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::Upstream {
        provider: provider.to_string(),
        detail: err.to_string(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
