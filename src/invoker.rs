//! Provider selection and normalized generation calls.
//!
//! [`ProviderRegistry`] maps provider names to [`Backend`]s.
//! [`GenerationInvoker`] calls the selected backend and folds every failure
//! (unknown provider, transport, HTTP status, missing credentials, malformed
//! reply) into a single [`PipelineError::GenerationFailed`].

use crate::backend::{Backend, LlmConfig, LlmRequest, MockBackend, OllamaBackend};
#[cfg(feature = "anthropic")]
use crate::backend::AnthropicBackend;
#[cfg(feature = "openai")]
use crate::backend::OpenAiBackend;
use crate::config::{AppEnv, EngineConfig};
use crate::error::Result;
use crate::PipelineError;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A provider name and the models it advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub models: Vec<String>,
}

/// Name-to-backend lookup.
///
/// # Example
///
/// ```
/// use prompt_pipeline::backend::MockBackend;
/// use prompt_pipeline::invoker::ProviderRegistry;
/// use std::sync::Arc;
///
/// let registry = ProviderRegistry::new().register(Arc::new(MockBackend::echo()));
/// assert!(registry.get("mock").is_ok());
/// assert!(registry.get("nope").is_err());
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
    fallback: Option<Arc<dyn Backend>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.backends.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own [`Backend::name`].
    pub fn register(self, backend: Arc<dyn Backend>) -> Self {
        let name = backend.name().to_string();
        self.register_as(name, backend)
    }

    /// Register a backend under an explicit name, replacing any previous entry.
    pub fn register_as(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    /// Answer every lookup, including unknown names, with `backend`.
    pub fn with_fallback(mut self, backend: Arc<dyn Backend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    /// Build the standard provider set from configuration.
    ///
    /// In [`AppEnv::Test`] every name resolves to an echoing [`MockBackend`].
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        let mock: Arc<dyn Backend> = Arc::new(MockBackend::echo());
        let mut registry = Self::new()
            .register(mock.clone())
            .register(Arc::new(OllamaBackend::new(client.clone(), &config.ollama_base_url)));

        #[cfg(feature = "openai")]
        {
            let mut openai = OpenAiBackend::new(client.clone()).with_base_url(&config.openai_base_url);
            if let Some(ref key) = config.openai_api_key {
                openai = openai.with_api_key(key);
            }
            registry = registry.register(Arc::new(openai));
        }

        #[cfg(feature = "anthropic")]
        {
            let mut anthropic = AnthropicBackend::new(client).with_base_url(&config.anthropic_base_url);
            if let Some(ref key) = config.anthropic_api_key {
                anthropic = anthropic.with_api_key(key);
            }
            registry = registry.register(Arc::new(anthropic));
        }

        if config.app_env == AppEnv::Test {
            registry = registry.with_fallback(mock);
        }
        Ok(registry)
    }

    /// Look up a backend by provider name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Backend>> {
        if let Some(ref fallback) = self.fallback {
            return Ok(fallback.clone());
        }
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownProvider(name.to_string()))
    }

    /// Registered providers and their models, sorted by name.
    pub fn catalog(&self) -> Vec<ProviderInfo> {
        self.backends
            .iter()
            .map(|(name, backend)| ProviderInfo {
                name: name.clone(),
                models: backend.models(),
            })
            .collect()
    }
}

/// Calls a named provider and normalizes its failures.
#[derive(Debug, Clone)]
pub struct GenerationInvoker {
    registry: Arc<ProviderRegistry>,
    llm: LlmConfig,
}

impl GenerationInvoker {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            llm: LlmConfig::default(),
        }
    }

    /// Sampling parameters applied to every call.
    pub fn with_llm_config(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Generate text for `prompt` with `provider`/`model`.
    ///
    /// Every error is returned as [`PipelineError::GenerationFailed`].
    pub async fn invoke(&self, prompt: &str, provider: &str, model: &str) -> Result<String> {
        self.try_invoke(prompt, provider, model)
            .await
            .map_err(|e| match e {
                PipelineError::GenerationFailed(msg) => PipelineError::GenerationFailed(msg),
                other => PipelineError::GenerationFailed(other.to_string()),
            })
    }

    async fn try_invoke(&self, prompt: &str, provider: &str, model: &str) -> Result<String> {
        let backend = self.registry.get(provider)?;
        let request = LlmRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            config: self.llm.clone(),
        };
        tracing::debug!(provider = backend.name(), model, "Invoking generation");
        let response = backend.complete(&request).await?;
        Ok(response.text)
    }
}
