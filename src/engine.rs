//! Wiring of services, stores, and providers.
//!
//! [`Engine`] bundles the template and pipeline services, the pipeline
//! executor, and the single-template runner over one store. It is designed
//! to be constructed once and shared across requests.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::EventHandler;
use crate::executor::PipelineExecutor;
use crate::invoker::{GenerationInvoker, ProviderInfo, ProviderRegistry};
use crate::pipelines::PipelineService;
use crate::runner::TemplateRunner;
use crate::store::{ExecutionStore, PipelineStore, TemplateStore};
use crate::templates::TemplateService;
use std::sync::Arc;

/// Every engine service over one shared store.
///
/// # Example
///
/// ```
/// use prompt_pipeline::config::{AppEnv, EngineConfig};
/// use prompt_pipeline::store::MemoryStore;
/// use prompt_pipeline::Engine;
/// use std::sync::Arc;
///
/// let config = EngineConfig::default().with_app_env(AppEnv::Test);
/// let engine = Engine::builder(Arc::new(MemoryStore::new()))
///     .config(config)
///     .build()
///     .unwrap();
/// assert!(engine.providers().iter().any(|p| p.name == "mock"));
/// ```
pub struct Engine {
    pub templates: TemplateService,
    pub pipelines: PipelineService,
    pub executor: PipelineExecutor,
    pub runner: TemplateRunner,
    invoker: GenerationInvoker,
}

impl Engine {
    /// Start a builder over a store implementing every persistence trait.
    pub fn builder<S>(store: Arc<S>) -> EngineBuilder
    where
        S: TemplateStore + PipelineStore + ExecutionStore + 'static,
    {
        EngineBuilder {
            templates: store.clone(),
            pipelines: store.clone(),
            executions: store,
            config: None,
            registry: None,
            event_handler: None,
        }
    }

    /// Providers available to pipeline steps and single-template runs.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.invoker.registry().catalog()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("executor", &self.executor)
            .field("invoker", &self.invoker)
            .finish()
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    templates: Arc<dyn TemplateStore>,
    pipelines: Arc<dyn PipelineStore>,
    executions: Arc<dyn ExecutionStore>,
    config: Option<EngineConfig>,
    registry: Option<ProviderRegistry>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl EngineBuilder {
    /// Set the configuration. Default: [`EngineConfig::default`].
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a hand-built provider registry instead of one derived from the
    /// configuration.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the run lifecycle event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let config = self.config.unwrap_or_default();
        let registry = match self.registry {
            Some(registry) => registry,
            None => ProviderRegistry::from_config(&config)?,
        };
        tracing::debug!(?config, "Building engine");

        let invoker = GenerationInvoker::new(Arc::new(registry)).with_llm_config(config.llm.clone());
        let templates = TemplateService::new(self.templates);
        let pipelines = PipelineService::new(self.pipelines, templates.clone());

        let mut executor = PipelineExecutor::new(
            pipelines.clone(),
            templates.clone(),
            self.executions.clone(),
            invoker.clone(),
        )
        .with_policy(config.preparation_failure);
        if let Some(handler) = self.event_handler {
            executor = executor.with_event_handler(handler);
        }
        let runner = TemplateRunner::new(templates.clone(), self.executions, invoker.clone());

        Ok(Engine {
            templates,
            pipelines,
            executor,
            runner,
            invoker,
        })
    }
}
