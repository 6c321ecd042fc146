//! # Prompt Pipeline
//!
//! Versioned prompt templates, and multi-step LLM pipelines that thread each
//! step's output into the prompts of the steps after it.
//!
//! ## Core Concepts
//!
//! - **[`Template`]**: named text with `{{variable}}` placeholders. Edits
//!   append immutable versions; execution always uses the latest one.
//! - **[`Pipeline`]**: an ordered list of steps, each bound to a template,
//!   a provider, a model, and the variable its output is stored under.
//! - **[`PipelineExecutor`]**: runs a pipeline, writing a
//!   [`PipelineExecution`] and one [`PipelineStepExecution`] per attempted
//!   step. The first failed step ends the run.
//! - **[`Backend`](backend::Backend)**: object-safe provider trait with
//!   OpenAI, Anthropic, Ollama, and mock implementations.
//! - **Stores**: [`TemplateStore`](store::TemplateStore),
//!   [`PipelineStore`](store::PipelineStore), and
//!   [`ExecutionStore`](store::ExecutionStore), with
//!   [`MemoryStore`](store::MemoryStore) implementing all three.
//!
//! ## Quick Start
//!
//! ```no_run
//! use prompt_pipeline::config::EngineConfig;
//! use prompt_pipeline::pipelines::{NewPipeline, StepDefinition};
//! use prompt_pipeline::store::MemoryStore;
//! use prompt_pipeline::templates::NewTemplate;
//! use prompt_pipeline::Engine;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(Arc::new(MemoryStore::new()))
//!         .config(EngineConfig::from_env()?)
//!         .build()?;
//!     let me = uuid::Uuid::new_v4();
//!
//!     let template = engine.templates.create(me, NewTemplate {
//!         name: "translate".into(),
//!         description: None,
//!         content: "Translate to English: {{text}}".into(),
//!     }).await?;
//!
//!     let pipeline = engine.pipelines.create(me, NewPipeline {
//!         name: "translate".into(),
//!         description: None,
//!         steps: vec![StepDefinition {
//!             template_id: template.id,
//!             provider: "ollama".into(),
//!             model: "llama3.2".into(),
//!             output_variable: "english_text".into(),
//!         }],
//!     }).await?;
//!
//!     let vars = HashMap::from([("text".to_string(), "Bonjour le monde".to_string())]);
//!     let run = engine.executor.execute(pipeline.id, vars, me).await?;
//!     println!("{:?}: {:?}", run.status, run.step_executions[0].output);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod invoker;
pub mod pipelines;
pub mod runner;
pub mod store;
pub mod substitution;
pub mod templates;
pub mod types;

pub use backend::{LlmConfig, MockBackend, OllamaBackend};
#[cfg(feature = "anthropic")]
pub use backend::AnthropicBackend;
#[cfg(feature = "openai")]
pub use backend::OpenAiBackend;
pub use config::{AppEnv, EngineConfig};
pub use engine::{Engine, EngineBuilder};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use executor::{PipelineExecutor, StepOutcome, StepPreparationPolicy};
pub use invoker::{GenerationInvoker, ProviderInfo, ProviderRegistry};
pub use pipelines::PipelineService;
pub use runner::{GenerateRequest, TemplateRunner};
pub use substitution::{extract_variable_names, substitute};
pub use templates::TemplateService;
pub use types::{
    ExecutionStatus, GenerationRecord, Pipeline, PipelineExecution, PipelineStep,
    PipelineStepExecution, Template, TemplateVersion,
};
