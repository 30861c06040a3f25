use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::generator::{GenerateRequest, ProviderConfig, TextGenerator};
use crate::models::{classify_status, ChatMessage};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub(crate) const REMEDIATION: &str =
    "install ollama, start it with `ollama serve`, and pull the configured model";

/// Local ollama backend speaking its native `/api/chat` protocol.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Deserialize)]
struct OllamaModelTag {
    name: String,
}

impl OllamaGenerator {
    pub fn new(config: &ProviderConfig) -> std::result::Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: config.temperature,
            client,
        })
    }

    fn unreachable(&self, err: &reqwest::Error) -> GatewayError {
        GatewayError::ProviderUnavailable {
            provider: "ollama".to_string(),
            remediation: format!("{REMEDIATION} ({err})"),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage::system(&request.system));
        }
        messages.push(ChatMessage::user(&request.prompt));

        let body = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: self.temperature.map(|t| OllamaOptions { temperature: t }),
        };

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream {
                provider: "ollama".to_string(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status("ollama", REMEDIATION, status.as_u16(), &text));
        }

        let parsed: OllamaChatResponse =
            resp.json().await.map_err(|e| GatewayError::InvalidResponse {
                provider: "ollama".to_string(),
                reason: e.to_string(),
            })?;
        debug!(model = %self.model, "ollama chat completed");
        Ok(parsed.message.content)
    }

    /// Reachability plus a model-presence check, so a missing pull is
    /// reported before any report interval is consumed.
    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.unreachable(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status("ollama", REMEDIATION, status.as_u16(), &text));
        }

        let tags: OllamaTagsResponse =
            resp.json().await.map_err(|e| GatewayError::InvalidResponse {
                provider: "ollama".to_string(),
                reason: e.to_string(),
            })?;

        // Tag names carry a ":latest" style suffix the config may omit.
        let present = tags.models.iter().any(|m| {
            m.name == self.model || m.name.split(':').next() == Some(self.model.as_str())
        });
        if present {
            Ok(())
        } else {
            Err(GatewayError::ProviderUnavailable {
                provider: "ollama".to_string(),
                remediation: format!("run `ollama pull {}`", self.model),
            })
        }
    }
}
