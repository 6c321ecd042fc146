//! Pipeline definitions.
//!
//! Step orders are assigned 1..N from submission order. Replacing steps
//! installs a fresh set in a single store write; the old steps are gone.

use crate::error::Result;
use crate::store::PipelineStore;
use crate::substitution::is_valid_variable_name;
use crate::templates::TemplateService;
use crate::types::{Pipeline, PipelineStep, UserId};
use crate::PipelineError;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// One step as submitted by a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    pub template_id: Uuid,
    pub provider: String,
    pub model: String,
    pub output_variable: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPipeline {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
}

/// Partial update. `steps`, when present, replaces the entire step set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Option<Vec<StepDefinition>>,
}

/// Owner-scoped pipeline operations.
#[derive(Clone)]
pub struct PipelineService {
    store: Arc<dyn PipelineStore>,
    templates: TemplateService,
}

impl std::fmt::Debug for PipelineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineService").finish_non_exhaustive()
    }
}

impl PipelineService {
    pub fn new(store: Arc<dyn PipelineStore>, templates: TemplateService) -> Self {
        Self { store, templates }
    }

    pub async fn create(&self, caller: UserId, request: NewPipeline) -> Result<Pipeline> {
        validate_name(&request.name)?;
        self.validate_steps(caller, &request.steps).await?;

        let id = Uuid::new_v4();
        let pipeline = Pipeline {
            id,
            owner: caller,
            name: request.name,
            description: request.description,
            steps: build_steps(id, request.steps),
            created_at: Utc::now(),
            updated_at: None,
        };

        self.store.insert_pipeline(pipeline.clone()).await?;
        tracing::info!(
            "Pipeline created: {} ({}) with {} steps",
            pipeline.name,
            pipeline.id,
            pipeline.steps.len()
        );
        Ok(pipeline)
    }

    /// Fetch a pipeline visible to `caller`.
    pub async fn get(&self, id: Uuid, caller: UserId) -> Result<Pipeline> {
        self.store
            .find_pipeline(id)
            .await?
            .filter(|p| p.owner == caller)
            .ok_or(PipelineError::PipelineNotFound)
    }

    /// Page through the caller's pipelines. Returns `(page, total)`.
    pub async fn list(&self, caller: UserId, skip: usize, limit: usize) -> Result<(Vec<Pipeline>, usize)> {
        let all = self.store.list_pipelines(caller).await?;
        let total = all.len();
        let page = all.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    pub async fn update(&self, id: Uuid, caller: UserId, update: PipelineUpdate) -> Result<Pipeline> {
        let mut pipeline = self.get(id, caller).await?;

        if let Some(name) = update.name {
            validate_name(&name)?;
            pipeline.name = name;
        }
        if let Some(description) = update.description {
            pipeline.description = Some(description);
        }
        if let Some(steps) = update.steps {
            self.validate_steps(caller, &steps).await?;
            pipeline.steps = build_steps(pipeline.id, steps);
        }
        pipeline.updated_at = Some(Utc::now());

        if !self.store.update_pipeline(pipeline.clone()).await? {
            return Err(PipelineError::PipelineNotFound);
        }
        Ok(pipeline)
    }

    /// Returns `false` if the pipeline was absent or not owned by `caller`.
    pub async fn delete(&self, id: Uuid, caller: UserId) -> Result<bool> {
        match self.get(id, caller).await {
            Ok(_) => {}
            Err(PipelineError::PipelineNotFound) => return Ok(false),
            Err(e) => return Err(e),
        }
        let deleted = self.store.delete_pipeline(id).await?;
        if deleted {
            tracing::info!("Pipeline deleted: {}", id);
        }
        Ok(deleted)
    }

    async fn validate_steps(&self, caller: UserId, steps: &[StepDefinition]) -> Result<()> {
        if steps.is_empty() {
            return Err(PipelineError::Validation(
                "Pipeline must have at least one step".to_string(),
            ));
        }

        for (idx, step) in steps.iter().enumerate() {
            let position = idx + 1;
            if !is_valid_variable_name(&step.output_variable) {
                return Err(PipelineError::Validation(format!(
                    "Step {}: output variable '{}' must contain only letters, digits or underscores",
                    position, step.output_variable
                )));
            }
            if step.provider.trim().is_empty() {
                return Err(PipelineError::Validation(format!(
                    "Step {}: provider cannot be empty",
                    position
                )));
            }
            if step.model.trim().is_empty() {
                return Err(PipelineError::Validation(format!(
                    "Step {}: model cannot be empty",
                    position
                )));
            }
            match self.templates.get(step.template_id, caller).await {
                Ok(_) => {}
                Err(PipelineError::TemplateNotFound) => {
                    return Err(PipelineError::Validation(format!(
                        "Step {}: template {} does not exist",
                        position, step.template_id
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn build_steps(pipeline_id: Uuid, definitions: Vec<StepDefinition>) -> Vec<PipelineStep> {
    definitions
        .into_iter()
        .zip(1u32..)
        .map(|(def, step_order)| PipelineStep {
            id: Uuid::new_v4(),
            pipeline_id,
            step_order,
            template_id: def.template_id,
            provider: def.provider,
            model: def.model,
            output_variable: def.output_variable,
        })
        .collect()
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PipelineError::Validation(
            "Pipeline name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::templates::NewTemplate;

    struct Fixture {
        pipelines: PipelineService,
        templates: TemplateService,
        owner: UserId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let templates = TemplateService::new(store.clone());
        Fixture {
            pipelines: PipelineService::new(store, templates.clone()),
            templates,
            owner: Uuid::new_v4(),
        }
    }

    async fn template(fx: &Fixture, content: &str) -> Uuid {
        fx.templates
            .create(
                fx.owner,
                NewTemplate {
                    name: "t".into(),
                    description: None,
                    content: content.into(),
                },
            )
            .await
            .unwrap()
            .id
    }

    fn step(template_id: Uuid, output_variable: &str) -> StepDefinition {
        StepDefinition {
            template_id,
            provider: "mock".into(),
            model: "mock-model".into(),
            output_variable: output_variable.into(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_contiguous_orders() {
        let fx = fixture();
        let t = template(&fx, "x").await;
        let pipeline = fx
            .pipelines
            .create(
                fx.owner,
                NewPipeline {
                    name: "chain".into(),
                    description: None,
                    steps: vec![step(t, "a"), step(t, "b"), step(t, "c")],
                },
            )
            .await
            .unwrap();
        let orders: Vec<u32> = pipeline.steps.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(pipeline.steps.iter().all(|s| s.pipeline_id == pipeline.id));
    }

    #[tokio::test]
    async fn test_replace_steps_discards_old_set() {
        let fx = fixture();
        let t = template(&fx, "x").await;
        let pipeline = fx
            .pipelines
            .create(
                fx.owner,
                NewPipeline {
                    name: "chain".into(),
                    description: None,
                    steps: vec![step(t, "a"), step(t, "b")],
                },
            )
            .await
            .unwrap();
        let old_ids: Vec<Uuid> = pipeline.steps.iter().map(|s| s.id).collect();

        let updated = fx
            .pipelines
            .update(
                pipeline.id,
                fx.owner,
                PipelineUpdate {
                    steps: Some(vec![step(t, "only")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.steps.len(), 1);
        assert_eq!(updated.steps[0].step_order, 1);
        assert_eq!(updated.steps[0].output_variable, "only");
        assert!(!old_ids.contains(&updated.steps[0].id));

        let stored = fx.pipelines.get(pipeline.id, fx.owner).await.unwrap();
        assert_eq!(stored.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_output_variable_rejected() {
        let fx = fixture();
        let t = template(&fx, "x").await;
        let err = fx
            .pipelines
            .create(
                fx.owner,
                NewPipeline {
                    name: "chain".into(),
                    description: None,
                    steps: vec![step(t, "not valid")],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_template_rejected() {
        let fx = fixture();
        let foreign = fx
            .templates
            .create(
                Uuid::new_v4(),
                NewTemplate {
                    name: "theirs".into(),
                    description: None,
                    content: "x".into(),
                },
            )
            .await
            .unwrap();

        for template_id in [Uuid::new_v4(), foreign.id] {
            let err = fx
                .pipelines
                .create(
                    fx.owner,
                    NewPipeline {
                        name: "chain".into(),
                        description: None,
                        steps: vec![step(template_id, "out")],
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_empty_steps_rejected() {
        let fx = fixture();
        let err = fx
            .pipelines
            .create(
                fx.owner,
                NewPipeline {
                    name: "chain".into(),
                    description: None,
                    steps: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_foreign_pipeline_not_found_and_not_deleted() {
        let fx = fixture();
        let t = template(&fx, "x").await;
        let pipeline = fx
            .pipelines
            .create(
                fx.owner,
                NewPipeline {
                    name: "chain".into(),
                    description: None,
                    steps: vec![step(t, "a")],
                },
            )
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        let err = fx.pipelines.get(pipeline.id, stranger).await.unwrap_err();
        assert!(matches!(err, PipelineError::PipelineNotFound));
        assert!(!fx.pipelines.delete(pipeline.id, stranger).await.unwrap());
        assert!(fx.pipelines.delete(pipeline.id, fx.owner).await.unwrap());
        assert!(fx.pipelines.get(pipeline.id, fx.owner).await.is_err());
    }
}
