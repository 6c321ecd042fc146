//! Backend for OpenAI-compatible APIs.
//!
//! Endpoint: `/v1/chat/completions`. The prompt is sent as a single user
//! message and the reply is read from `choices[0].message.content`.

use super::{check_status, pick_metadata, Backend, LlmRequest, LlmResponse, DEFAULT_OPENAI_URL};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use prompt_pipeline::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new(reqwest::Client::new()).with_api_key("sk-...");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    /// If set, sent as `Authorization: Bearer {key}`.
    pub(crate) api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_OPENAI_URL.to_string(),
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

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "max_tokens": request.config.max_tokens,
        });
        if let Some(temp) = request.config.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    fn extract_text(json_resp: &Value) -> Option<String> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig("OpenAI API key is not configured".to_string()))?;
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(request);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Other(format!("Failed to connect to LLM at {}: {}", url, e))
            })?;
        let resp = check_status(resp).await?;
        let status = resp.status().as_u16();

        let json_resp: Value = resp.json().await?;
        let text = Self::extract_text(&json_resp).ok_or_else(|| {
            PipelineError::Other("OpenAI response did not contain message content".to_string())
        })?;

        Ok(LlmResponse {
            text,
            status,
            metadata: pick_metadata(&json_resp, &["id", "model", "usage"]),
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn models(&self) -> Vec<String> {
        vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmConfig;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "gpt-4o".into(),
            prompt: "Summarize: x".into(),
            config: LlmConfig::default(),
        }
    }

    #[test]
    fn test_build_body_single_user_message() {
        let body = OpenAiBackend::build_body(&request());
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Summarize: x");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_extract_text() {
        let resp = json!({"choices": [{"message": {"role": "assistant", "content": "Done"}}]});
        assert_eq!(OpenAiBackend::extract_text(&resp).as_deref(), Some("Done"));
        assert!(OpenAiBackend::extract_text(&json!({"choices": []})).is_none());
    }

    #[test]
    fn test_debug_masks_key() {
        let backend = OpenAiBackend::new(Client::new()).with_api_key("sk-secret-value");
        let debug = format!("{:?}", backend);
        assert!(!debug.contains("sk-secret-value"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_sending() {
        let backend = OpenAiBackend::new(Client::new()).with_base_url("http://127.0.0.1:9");
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
