//! OpenAI-compatible chat-completions adapter.
//!
//! Defaults to Fireworks (`/inference/v1/chat/completions`), but any endpoint that
//! speaks the OpenAI chat-completions shape works.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use relay_core::{
    config::LlmConfig,
    errors::Error,
    model::{client::CompletionClient, types::ChatMessage},
    Result,
};

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    cfg: LlmConfig,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    presence_penalty: f64,
    frequency_penalty: f64,
}

impl OpenAiClient {
    pub fn new(cfg: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.cfg.model,
            messages,
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
            top_p: self.cfg.top_p,
            top_k: self.cfg.top_k,
            presence_penalty: self.cfg.presence_penalty,
            frequency_penalty: self.cfg.frequency_penalty,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| Error::ModelUnavailable(format!("completion request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet = body.chars().take(200).collect::<String>();
            let msg = format!("completion failed: {status} {snippet}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                Error::ModelUnavailable(msg)
            } else {
                Error::ModelError(msg)
            });
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::ModelError(format!("completion json error: {e}")))?;

        let text = extract_reply(&v)?;
        debug!(model = %self.cfg.model, chars = text.chars().count(), "completion received");
        Ok(text)
    }
}

/// `choices[0].message.content`, non-empty.
fn extract_reply(v: &serde_json::Value) -> Result<String> {
    let content = v
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            Error::ModelError("completion response has no choices[0].message.content".to_string())
        })?;

    if content.trim().is_empty() {
        return Err(Error::ModelError("completion returned empty text".to_string()));
    }

    Ok(content.to_string())
}
