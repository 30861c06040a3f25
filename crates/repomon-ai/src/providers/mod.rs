//! Backend implementations of [`TextGenerator`](crate::TextGenerator).

mod deepseek;
mod ollama;
mod openai;

pub use deepseek::DeepseekGenerator;
pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

pub(crate) use deepseek::REMEDIATION as DEEPSEEK_REMEDIATION;
pub(crate) use ollama::REMEDIATION as OLLAMA_REMEDIATION;
pub(crate) use openai::REMEDIATION as OPENAI_REMEDIATION;

use crate::error::Result;
use crate::generator::GenerateRequest;
use crate::models::{classify_status, classify_transport, ChatMessage, ChatRequest, ChatResponse};

/// Run one chat completion against an OpenAI-compatible endpoint and
/// extract the first choice. Shared by the hosted providers.
pub(crate) async fn openai_style_chat(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    provider: &str,
    remediation: &str,
    model: &str,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    request: &GenerateRequest,
) -> Result<String> {
    let mut messages = Vec::with_capacity(2);
    if !request.system.is_empty() {
        messages.push(ChatMessage::system(&request.system));
    }
    messages.push(ChatMessage::user(&request.prompt));

    let body = ChatRequest {
        model: model.to_string(),
        messages,
        temperature,
        max_tokens,
    };

    let resp = client
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| classify_transport(provider, e))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(classify_status(provider, remediation, status.as_u16(), &text));
    }

    let parsed: ChatResponse = resp
        .json()
        .await
        .map_err(|e| classify_transport(provider, e))?;
    parsed.content(provider)
}

/// Probe an OpenAI-compatible endpoint for reachability and valid
/// credentials via the model listing route.
pub(crate) async fn openai_style_health(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    provider: &str,
    remediation: &str,
) -> Result<()> {
    let resp = client
        .get(format!("{base_url}/models"))
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| classify_transport(provider, e))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let text = resp.text().await.unwrap_or_default();
    Err(classify_status(provider, remediation, status.as_u16(), &text))
}
