use std::time::Duration;

use async_trait::async_trait;

use super::{openai_style_chat, openai_style_health};
use crate::error::Result;
use crate::generator::{GenerateRequest, ProviderConfig, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub(crate) const REMEDIATION: &str = "set OPENAI_API_KEY to a valid API key";

/// Hosted OpenAI backend.
pub struct OpenAiGenerator {
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(
        config: &ProviderConfig,
        api_key: String,
    ) -> std::result::Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        openai_style_chat(
            &self.client,
            &self.base_url,
            &self.api_key,
            "openai",
            REMEDIATION,
            &self.model,
            self.temperature,
            self.max_tokens,
            request,
        )
        .await
    }

    async fn health_check(&self) -> Result<()> {
        openai_style_health(&self.client, &self.base_url, &self.api_key, "openai", REMEDIATION)
            .await
    }
}
