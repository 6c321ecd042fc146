//! Backend for Ollama's native API.
//!
//! [`OllamaBackend`] sends prompt-only requests to `/api/generate` with
//! streaming disabled and reads the `response` field.

use super::{check_status, pick_metadata, Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for Ollama's native API.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the JSON body for `/api/generate`.
    fn build_body(request: &LlmRequest) -> Value {
        let mut options = json!({ "num_predict": request.config.max_tokens });
        if let Some(temp) = request.config.temperature {
            options["temperature"] = json!(temp);
        }
        json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        })
    }

    fn extract_text(json_resp: &Value) -> Option<String> {
        json_resp
            .get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let body = Self::build_body(request);

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| {
            PipelineError::Other(format!("Failed to connect to LLM at {}: {}", url, e))
        })?;
        let resp = check_status(resp).await?;
        let status = resp.status().as_u16();

        let json_resp: Value = resp.json().await?;
        let text = Self::extract_text(&json_resp).ok_or_else(|| {
            PipelineError::Other("Ollama response did not contain a 'response' field".to_string())
        })?;

        Ok(LlmResponse {
            text,
            status,
            metadata: pick_metadata(&json_resp, &["model", "total_duration", "eval_count", "prompt_eval_count"]),
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }

    fn models(&self) -> Vec<String> {
        vec!["llama3.2".to_string()]
    }
}
