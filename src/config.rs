//! Engine configuration.
//!
//! Loaded from the environment, from a JSON document, or (feature `yaml`)
//! from YAML. Unset fields fall back to [`EngineConfig::default`].

use crate::backend::{LlmConfig, DEFAULT_ANTHROPIC_URL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_URL};
use crate::error::Result;
use crate::executor::StepPreparationPolicy;
use crate::PipelineError;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment. In [`AppEnv::Test`] every provider name resolves
/// to an echoing [`MockBackend`](crate::backend::MockBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Test,
    Production,
}

impl FromStr for AppEnv {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown APP_ENV '{}'",
                other
            ))),
        }
    }
}

/// Everything needed to build the provider registry and executors.
///
/// # Example
///
/// ```
/// use prompt_pipeline::config::{AppEnv, EngineConfig};
///
/// let config = EngineConfig::default()
///     .with_app_env(AppEnv::Test)
///     .with_request_timeout_secs(30);
/// assert_eq!(config.request_timeout().as_secs(), 30);
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub app_env: AppEnv,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub ollama_base_url: String,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    /// Per-request HTTP timeout for provider calls.
    pub request_timeout_secs: u64,
    /// Sampling defaults applied to every generation call.
    pub llm: LlmConfig,
    /// How step preparation failures (missing template or variable) are handled.
    pub preparation_failure: StepPreparationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_env: AppEnv::default(),
            openai_api_key: None,
            anthropic_api_key: None,
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_URL.to_string(),
            anthropic_base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            request_timeout_secs: 60,
            llm: LlmConfig::default(),
            preparation_failure: StepPreparationPolicy::default(),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("app_env", &self.app_env)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "***"))
            .field("ollama_base_url", &self.ollama_base_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("llm", &self.llm)
            .field("preparation_failure", &self.preparation_failure)
            .finish()
    }
}

impl EngineConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Recognized keys: `APP_ENV`, `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
    /// `OLLAMA_BASE_URL`, `OPENAI_BASE_URL`, `ANTHROPIC_BASE_URL`,
    /// `LLM_REQUEST_TIMEOUT_SECS`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(env) = get("APP_ENV") {
            config.app_env = env.parse()?;
        }
        config.openai_api_key = get("OPENAI_API_KEY");
        config.anthropic_api_key = get("ANTHROPIC_API_KEY");
        if let Some(url) = get("OLLAMA_BASE_URL") {
            config.ollama_base_url = url;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            config.anthropic_base_url = url;
        }
        if let Some(secs) = get("LLM_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!(
                    "LLM_REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    secs
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_app_env(mut self, env: AppEnv) -> Self {
        self.app_env = env;
        self
    }

    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn with_anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(key.into());
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_preparation_failure(mut self, policy: StepPreparationPolicy) -> Self {
        self.preparation_failure = policy;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "request timeout must be at least one second".to_string(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be positive".to_string(),
            ));
        }
        for (name, url) in [
            ("ollama_base_url", &self.ollama_base_url),
            ("openai_base_url", &self.openai_base_url),
            ("anthropic_base_url", &self.anthropic_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        Ok(())
    }
}
