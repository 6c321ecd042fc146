//! Single-template execution.
//!
//! Unlike a pipeline step, every failure after the template has been
//! resolved (a missing variable included) ends up in the returned record as
//! `Failed` rather than as an `Err`.

use crate::error::Result;
use crate::invoker::GenerationInvoker;
use crate::store::ExecutionStore;
use crate::substitution::substitute;
use crate::templates::TemplateService;
use crate::types::{snapshot_variables, ExecutionStatus, GenerationRecord, UserId, Variables};
use crate::PipelineError;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// A request to render one template and generate from it.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub template_id: Uuid,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub variables: Variables,
}

/// Runs one template against a provider and keeps a [`GenerationRecord`].
#[derive(Clone)]
pub struct TemplateRunner {
    templates: TemplateService,
    executions: Arc<dyn ExecutionStore>,
    invoker: GenerationInvoker,
}

impl std::fmt::Debug for TemplateRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRunner")
            .field("invoker", &self.invoker)
            .finish()
    }
}

impl TemplateRunner {
    pub fn new(
        templates: TemplateService,
        executions: Arc<dyn ExecutionStore>,
        invoker: GenerationInvoker,
    ) -> Self {
        Self {
            templates,
            executions,
            invoker,
        }
    }

    /// Render the latest version of a template and generate from it.
    ///
    /// Fails with [`PipelineError::TemplateNotFound`] before any record is
    /// written if the template is not visible to `caller`.
    pub async fn execute(&self, request: GenerateRequest, caller: UserId) -> Result<GenerationRecord> {
        let template = self.templates.get(request.template_id, caller).await?;
        let version = template
            .latest_version()
            .ok_or(PipelineError::TemplateHasNoVersions(template.id))?;

        let mut record = GenerationRecord {
            id: Uuid::new_v4(),
            template_id: template.id,
            template_name: template.name.clone(),
            template_version_id: version.id,
            template_version_number: version.version_number,
            owner: caller,
            provider: request.provider.clone(),
            model: request.model.clone(),
            variables: snapshot_variables(&request.variables)?,
            status: ExecutionStatus::Running,
            output: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.executions.insert_generation(&record).await?;

        let result = match substitute(&version.content, &request.variables) {
            Ok(prompt) => {
                self.invoker
                    .invoke(&prompt, &request.provider, &request.model)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                record.status = ExecutionStatus::Completed;
                record.output = Some(output);
            }
            Err(e) => {
                tracing::warn!("Generation from template {} failed: {}", template.name, e);
                record.status = ExecutionStatus::Failed;
                record.error = Some(e.to_string());
            }
        }
        record.completed_at = Some(Utc::now());
        self.executions.update_generation(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, id: Uuid, caller: UserId) -> Result<Option<GenerationRecord>> {
        Ok(self
            .executions
            .find_generation(id)
            .await?
            .filter(|r| r.owner == caller))
    }

    /// Generation records started by `caller`, newest first.
    pub async fn list(&self, caller: UserId) -> Result<Vec<GenerationRecord>> {
        self.executions.list_generations(caller).await
    }
}
