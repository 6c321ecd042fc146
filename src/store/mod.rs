//! Persistence traits for templates, pipelines and execution records.
//!
//! Stores are plain record keepers: they do not filter by owner, number
//! versions, or validate. That logic lives in the services built on top
//! ([`TemplateService`](crate::templates::TemplateService),
//! [`PipelineService`](crate::pipelines::PipelineService),
//! [`PipelineExecutor`](crate::executor::PipelineExecutor)).
//!
//! Every write is durable (visible to other readers) once the returned
//! future resolves. [`MemoryStore`] implements all three traits.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{
    GenerationRecord, Pipeline, PipelineExecution, PipelineStepExecution, Template,
    TemplateVersion, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage for templates and their versions.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert_template(&self, template: Template) -> Result<()>;

    /// Set name and description in place, leaving versions untouched.
    /// Returns `false` if absent.
    async fn update_template_details(
        &self,
        id: Uuid,
        name: String,
        description: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Append a version numbered one past the current maximum. Numbering and
    /// insertion happen as one atomic write, so concurrent appends never
    /// share a number. Returns `None` if the template is absent.
    async fn append_version(
        &self,
        template_id: Uuid,
        content: String,
        created_at: DateTime<Utc>,
    ) -> Result<Option<TemplateVersion>>;

    async fn find_template(&self, id: Uuid) -> Result<Option<Template>>;

    /// All templates owned by `owner`, oldest first.
    async fn list_templates(&self, owner: UserId) -> Result<Vec<Template>>;

    async fn delete_template(&self, id: Uuid) -> Result<bool>;
}

/// Storage for pipelines. Steps are stored with their pipeline, so
/// replacing a pipeline replaces its step set in one write.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<()>;

    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<bool>;

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>>;

    /// All pipelines owned by `owner`, oldest first.
    async fn list_pipelines(&self, owner: UserId) -> Result<Vec<Pipeline>>;

    async fn delete_pipeline(&self, id: Uuid) -> Result<bool>;
}

/// Storage for pipeline runs, their step records, and single-template
/// generation records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a run header. Any `step_executions` on the value are ignored.
    async fn insert_run(&self, run: &PipelineExecution) -> Result<()>;

    /// Update status and completion time of a run.
    async fn update_run(&self, run: &PipelineExecution) -> Result<()>;

    async fn insert_step_execution(&self, step: &PipelineStepExecution) -> Result<()>;

    async fn update_step_execution(&self, step: &PipelineStepExecution) -> Result<()>;

    /// A run with its step records ordered by `step_order`.
    async fn find_run(&self, id: Uuid) -> Result<Option<PipelineExecution>>;

    /// Runs of a pipeline, newest first.
    async fn list_runs(&self, pipeline_id: Uuid) -> Result<Vec<PipelineExecution>>;

    /// Delete a run and all of its step records.
    async fn delete_run(&self, id: Uuid) -> Result<bool>;

    async fn insert_generation(&self, record: &GenerationRecord) -> Result<()>;

    async fn update_generation(&self, record: &GenerationRecord) -> Result<()>;

    async fn find_generation(&self, id: Uuid) -> Result<Option<GenerationRecord>>;

    /// Generation records started by `owner`, newest first.
    async fn list_generations(&self, owner: UserId) -> Result<Vec<GenerationRecord>>;
}
