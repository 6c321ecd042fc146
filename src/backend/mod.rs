//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and provider-specific
//! HTTP APIs. Built-in implementations: [`OllamaBackend`], [`OpenAiBackend`],
//! [`AnthropicBackend`], and [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! GenerationInvoker ──► LlmRequest ──► Backend::complete() ──► LlmResponse
//!                                             │
//!                  ┌──────────────┬───────────┴──────┬──────────────┐
//!             OllamaBackend  OpenAiBackend   AnthropicBackend   MockBackend
//!             /api/generate  /v1/chat/       /v1/messages       canned replies
//!                            completions
//! ```

#[cfg(feature = "anthropic")]
pub mod anthropic;
pub mod mock;
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicBackend;
pub use mock::{MockBackend, MockReply};
pub use ollama::OllamaBackend;
#[cfg(feature = "openai")]
pub use openai::OpenAiBackend;

use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Temperature. `None` leaves the provider default in place.
    pub temperature: Option<f64>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: 4096,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }
}

/// A normalized, provider-agnostic LLM request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"gpt-4o"`, `"claude-haiku-4-5-20251001"`).
    pub model: String,

    /// The fully substituted prompt, sent as a single user message.
    pub prompt: String,

    pub config: LlmConfig,
}

/// A normalized LLM response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model info).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over LLM providers.
///
/// Implementors own their HTTP client, endpoint and credentials, and
/// translate a [`LlmRequest`] into one blocking completion call.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming LLM call.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Provider name used to select this backend (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Models this backend advertises.
    fn models(&self) -> Vec<String>;
}

/// Turn a non-success response into [`PipelineError::HttpError`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(PipelineError::HttpError { status, body })
}

/// Collect selected top-level keys of a provider response.
pub(crate) fn pick_metadata(json_resp: &serde_json::Value, keys: &[&str]) -> Option<serde_json::Value> {
    let meta: serde_json::Map<String, serde_json::Value> = keys
        .iter()
        .filter_map(|k| json_resp.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
    if meta.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(meta))
    }
}
