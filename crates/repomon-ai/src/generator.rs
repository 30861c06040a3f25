use async_trait::async_trait;

use crate::error::Result;

/// One text-generation call. Stateless: providers hold no mutable state
/// across calls, so concurrent `generate` invocations are safe.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// System instruction; may be empty for backends without one.
    pub system: String,
    pub prompt: String,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Uniform contract over text-generation backends (one implementation per
/// provider family, selected by configuration value).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name used in configuration, logs and diagnostics.
    fn provider(&self) -> &str;

    /// Model identifier this generator is bound to.
    fn model_name(&self) -> &str;

    /// Synthesize text for the request.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Verify the backend is reachable and usable before a run.
    async fn health_check(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("provider", &self.provider())
            .field("model", &self.model_name())
            .finish()
    }
}

/// Backend selection and tuning, threaded in explicitly rather than read
/// from ambient process state.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Backend family: "ollama", "openai" or "deepseek".
    pub provider: String,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}
