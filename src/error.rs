use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the pipeline engine and its collaborators.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The pipeline does not exist or is not owned by the caller.
    #[error("Pipeline not found")]
    PipelineNotFound,

    /// The template does not exist or is not owned by the caller.
    #[error("Template not found")]
    TemplateNotFound,

    /// A stored template has no versions at all.
    #[error("Template {0} has no versions")]
    TemplateHasNoVersions(Uuid),

    /// A `{{name}}` token had no value in the variable mapping.
    #[error("Missing variable: {0}")]
    MissingVariable(String),

    /// Normalized failure of a generation call.
    ///
    /// Displays as the bare message so step records keep the provider's text.
    #[error("{0}")]
    GenerationFailed(String),

    /// No backend is registered under the requested provider name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A create or update request was rejected.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON encoding or decoding failed at the serde level.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider returned a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 500).
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Invalid configuration detected while loading or building.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The persistence layer failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Whether this error describes a missing or unusable definition
    /// (pipeline, template, or a template without versions) rather than a
    /// failed execution.
    pub fn is_definitional(&self) -> bool {
        matches!(
            self,
            PipelineError::PipelineNotFound
                | PipelineError::TemplateNotFound
                | PipelineError::TemplateHasNoVersions(_)
        )
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
