//! Backend for the Anthropic Messages API.
//!
//! Endpoint: `/v1/messages`, authenticated with `x-api-key`. The reply is
//! read from the first content block.

use super::{check_status, pick_metadata, Backend, LlmRequest, LlmResponse, DEFAULT_ANTHROPIC_URL};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    pub(crate) api_key: Option<String>,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn build_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.config.max_tokens,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(temp) = request.config.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    fn extract_text(json_resp: &Value) -> Option<String> {
        json_resp
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|block| block.get("text"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig("Anthropic API key is not configured".to_string()))?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(request);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Other(format!("Failed to connect to LLM at {}: {}", url, e))
            })?;
        let resp = check_status(resp).await?;
        let status = resp.status().as_u16();

        let json_resp: Value = resp.json().await?;
        let text = Self::extract_text(&json_resp).ok_or_else(|| {
            PipelineError::Other("Anthropic response did not contain a text block".to_string())
        })?;

        Ok(LlmResponse {
            text,
            status,
            metadata: pick_metadata(&json_resp, &["id", "model", "usage", "stop_reason"]),
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-sonnet-4-5-20250929".to_string(),
            "claude-haiku-4-5-20251001".to_string(),
        ]
    }
}
