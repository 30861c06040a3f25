use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::generator::{GenerateRequest, ProviderConfig, TextGenerator};
use crate::providers::{self, DeepseekGenerator, OllamaGenerator, OpenAiGenerator};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Retrying front door over a [`TextGenerator`].
///
/// Transient upstream failures are retried with capped exponential
/// backoff and jitter; auth and request errors pass through untouched on
/// the first occurrence. When the retry budget runs out the last error is
/// re-raised as [`GatewayError::ProviderUnavailable`] carrying a
/// provider-specific remediation hint.
pub struct Gateway {
    inner: Box<dyn TextGenerator>,
    max_retries: u32,
    backoff_base: Duration,
}

impl Gateway {
    /// Build the configured backend and wrap it. Fails fast on an unknown
    /// provider name or a missing credential.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self::new(build_generator(config)?))
    }

    pub fn new(inner: Box<dyn TextGenerator>) -> Self {
        Self {
            inner,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Override the retry budget. `max_retries` counts retries after the
    /// first attempt.
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = backoff_base;
        self
    }

    pub fn provider(&self) -> &str {
        self.inner.provider()
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let provider = self.inner.provider().to_string();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.generate(request).await {
                Ok(text) => {
                    info!(
                        provider = %provider,
                        model = %self.inner.model_name(),
                        attempt,
                        chars = text.len(),
                        "generation completed"
                    );
                    return Ok(text);
                }
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    let delay = backoff_delay(self.backoff_base, attempt);
                    warn!(
                        provider = %provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient generation failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    warn!(provider = %provider, attempts = attempt, error = %err, "retry budget exhausted");
                    return Err(GatewayError::ProviderUnavailable {
                        provider: provider.clone(),
                        remediation: format!(
                            "{} (gave up after {attempt} attempts, last error: {err})",
                            remediation_for(&provider)
                        ),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Instantiate the backend named by `config.provider`.
pub fn build_generator(config: &ProviderConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "ollama" => {
            let gen = OllamaGenerator::new(config).map_err(|e| init_failure("ollama", e))?;
            Ok(Box::new(gen))
        }
        "openai" => {
            let key = require_key(config, "openai")?;
            let gen = OpenAiGenerator::new(config, key).map_err(|e| init_failure("openai", e))?;
            Ok(Box::new(gen))
        }
        "deepseek" => {
            let key = require_key(config, "deepseek")?;
            let gen =
                DeepseekGenerator::new(config, key).map_err(|e| init_failure("deepseek", e))?;
            Ok(Box::new(gen))
        }
        other => Err(GatewayError::ProviderUnavailable {
            provider: other.to_string(),
            remediation: "set llm.provider to one of: ollama, openai, deepseek".to_string(),
        }),
    }
}

fn require_key(config: &ProviderConfig, provider: &str) -> Result<String> {
    config.api_key.clone().ok_or_else(|| GatewayError::Auth {
        provider: provider.to_string(),
        remediation: remediation_for(provider).to_string(),
    })
}

fn init_failure(provider: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::ProviderUnavailable {
        provider: provider.to_string(),
        remediation: format!("http client initialization failed: {err}"),
    }
}

fn remediation_for(provider: &str) -> &'static str {
    match provider {
        "ollama" => providers::OLLAMA_REMEDIATION,
        "openai" => providers::OPENAI_REMEDIATION,
        "deepseek" => providers::DEEPSEEK_REMEDIATION,
        _ => "check the llm provider configuration",
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << (attempt - 1).min(16)).min(BACKOFF_CAP);
    let jitter_max = (exp.as_millis() as u64 / 4).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_max);
    exp + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct FlakyGenerator {
        calls: AtomicU32,
        succeed_after: Option<u32>,
        error: fn() -> GatewayError,
    }

    impl FlakyGenerator {
        fn failing(error: fn() -> GatewayError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_after: None,
                error,
            }
        }

        fn recovering(succeed_after: u32, error: fn() -> GatewayError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_after: Some(succeed_after),
                error,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FlakyGenerator {
        fn provider(&self) -> &str {
            "openai"
        }

        fn model_name(&self) -> &str {
            "test-model"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_after {
                Some(n) if call > n => Ok("report body".to_string()),
                _ => Err((self.error)()),
            }
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn upstream() -> GatewayError {
        GatewayError::Upstream {
            provider: "openai".to_string(),
            detail: "status=503".to_string(),
        }
    }

    fn auth() -> GatewayError {
        GatewayError::Auth {
            provider: "openai".to_string(),
            remediation: "set OPENAI_API_KEY".to_string(),
        }
    }

    fn gateway(inner: FlakyGenerator) -> (std::sync::Arc<FlakyGenerator>, Gateway) {
        // Box<dyn> would hide the call counter, so share it through an Arc.
        let shared = std::sync::Arc::new(inner);
        let counted = shared.clone();

        struct Forward(std::sync::Arc<FlakyGenerator>);

        #[async_trait]
        impl TextGenerator for Forward {
            fn provider(&self) -> &str {
                self.0.provider()
            }
            fn model_name(&self) -> &str {
                self.0.model_name()
            }
            async fn generate(&self, request: &GenerateRequest) -> Result<String> {
                self.0.generate(request).await
            }
            async fn health_check(&self) -> Result<()> {
                self.0.health_check().await
            }
        }

        let gw = Gateway::new(Box::new(Forward(counted)))
            .with_retry_policy(3, Duration::from_millis(0));
        (shared, gw)
    }

    #[tokio::test]
    async fn persistent_upstream_failure_exhausts_budget() {
        let (inner, gw) = gateway(FlakyGenerator::failing(upstream));
        let err = gw
            .generate(&GenerateRequest::new("", "summarize"))
            .await
            .unwrap_err();

        // 1 initial attempt + 3 retries.
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, GatewayError::ProviderUnavailable { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn auth_failure_is_never_retried() {
        let (inner, gw) = gateway(FlakyGenerator::failing(auth));
        let err = gw
            .generate(&GenerateRequest::new("", "summarize"))
            .await
            .unwrap_err();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, GatewayError::Auth { .. }));
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        let (inner, gw) = gateway(FlakyGenerator::recovering(2, upstream));
        let text = gw
            .generate(&GenerateRequest::new("sys", "summarize"))
            .await
            .unwrap();

        assert_eq!(text, "report body");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unknown_provider_names_the_valid_set() {
        let cfg = ProviderConfig {
            provider: "claude".to_string(),
            ..Default::default()
        };
        let err = build_generator(&cfg).unwrap_err();
        assert!(err.to_string().contains("ollama, openai, deepseek"));
    }

    #[test]
    fn hosted_provider_without_key_is_auth_error() {
        let cfg = ProviderConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_generator(&cfg).unwrap_err(),
            GatewayError::Auth { .. }
        ));
    }

    #[test]
    fn backoff_is_capped() {
        let d = backoff_delay(Duration::from_millis(500), 12);
        assert!(d >= Duration::from_secs(10));
        assert!(d <= Duration::from_secs(13));
    }
}
