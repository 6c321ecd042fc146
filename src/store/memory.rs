//! In-process store for tests, demos and single-node embedding.
//!
//! Records are kept in insertion order, so "oldest first" and "newest first"
//! listings are deterministic even when timestamps collide.

use super::{ExecutionStore, PipelineStore, TemplateStore};
use crate::error::Result;
use crate::types::{
    GenerationRecord, Pipeline, PipelineExecution, PipelineStepExecution, Template,
    TemplateVersion, UserId,
};
use crate::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    templates: Vec<Template>,
    pipelines: Vec<Pipeline>,
    runs: Vec<PipelineExecution>,
    step_executions: Vec<PipelineStepExecution>,
    generations: Vec<GenerationRecord>,
}

/// A store backed by process memory.
///
/// Cloning is not supported; share it as `Arc<MemoryStore>` and coerce to
/// whichever store trait a service needs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of run headers currently stored.
    pub async fn run_count(&self) -> usize {
        self.state.read().await.runs.len()
    }

    /// Number of step records currently stored, across all runs.
    pub async fn step_execution_count(&self) -> usize {
        self.state.read().await.step_executions.len()
    }
}

fn replace_by_id<T>(items: &mut [T], item: T, id_of: impl Fn(&T) -> Uuid) -> bool {
    let id = id_of(&item);
    match items.iter_mut().find(|existing| id_of(existing) == id) {
        Some(slot) => {
            *slot = item;
            true
        }
        None => false,
    }
}

fn remove_by_id<T>(items: &mut Vec<T>, id: Uuid, id_of: impl Fn(&T) -> Uuid) -> bool {
    let before = items.len();
    items.retain(|item| id_of(item) != id);
    items.len() != before
}

fn duplicate(kind: &str, id: Uuid) -> PipelineError {
    PipelineError::Storage(format!("{} {} already exists", kind, id))
}

fn missing(kind: &str, id: Uuid) -> PipelineError {
    PipelineError::Storage(format!("{} {} does not exist", kind, id))
}

fn finished(kind: &str, id: Uuid) -> PipelineError {
    PipelineError::Storage(format!("{} {} is already finished", kind, id))
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn insert_template(&self, template: Template) -> Result<()> {
        let mut state = self.state.write().await;
        if state.templates.iter().any(|t| t.id == template.id) {
            return Err(duplicate("template", template.id));
        }
        state.templates.push(template);
        Ok(())
    }

    async fn update_template_details(
        &self,
        id: Uuid,
        name: String,
        description: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.templates.iter_mut().find(|t| t.id == id) {
            Some(template) => {
                template.name = name;
                template.description = description;
                template.updated_at = Some(updated_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_version(
        &self,
        template_id: Uuid,
        content: String,
        created_at: DateTime<Utc>,
    ) -> Result<Option<TemplateVersion>> {
        let mut state = self.state.write().await;
        let Some(template) = state.templates.iter_mut().find(|t| t.id == template_id) else {
            return Ok(None);
        };
        let version = TemplateVersion {
            id: Uuid::new_v4(),
            template_id,
            version_number: template.next_version_number(),
            content,
            created_at,
        };
        template.versions.push(version.clone());
        template.updated_at = Some(created_at);
        Ok(Some(version))
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<Template>> {
        let state = self.state.read().await;
        Ok(state.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn list_templates(&self, owner: UserId) -> Result<Vec<Template>> {
        let state = self.state.read().await;
        Ok(state
            .templates
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect())
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(remove_by_id(&mut state.templates, id, |t| t.id))
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<()> {
        let mut state = self.state.write().await;
        if state.pipelines.iter().any(|p| p.id == pipeline.id) {
            return Err(duplicate("pipeline", pipeline.id));
        }
        state.pipelines.push(pipeline);
        Ok(())
    }

    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(replace_by_id(&mut state.pipelines, pipeline, |p| p.id))
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>> {
        let state = self.state.read().await;
        Ok(state.pipelines.iter().find(|p| p.id == id).cloned())
    }

    async fn list_pipelines(&self, owner: UserId) -> Result<Vec<Pipeline>> {
        let state = self.state.read().await;
        Ok(state
            .pipelines
            .iter()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect())
    }

    async fn delete_pipeline(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(remove_by_id(&mut state.pipelines, id, |p| p.id))
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_run(&self, run: &PipelineExecution) -> Result<()> {
        let mut state = self.state.write().await;
        if state.runs.iter().any(|r| r.id == run.id) {
            return Err(duplicate("run", run.id));
        }
        let mut header = run.clone();
        header.step_executions.clear();
        state.runs.push(header);
        Ok(())
    }

    async fn update_run(&self, run: &PipelineExecution) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| missing("run", run.id))?;
        if stored.status.is_terminal() {
            return Err(finished("run", run.id));
        }
        stored.status = run.status;
        stored.completed_at = run.completed_at;
        Ok(())
    }

    async fn insert_step_execution(&self, step: &PipelineStepExecution) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.runs.iter().any(|r| r.id == step.pipeline_execution_id) {
            return Err(missing("run", step.pipeline_execution_id));
        }
        if state.step_executions.iter().any(|s| s.id == step.id) {
            return Err(duplicate("step execution", step.id));
        }
        state.step_executions.push(step.clone());
        Ok(())
    }

    async fn update_step_execution(&self, step: &PipelineStepExecution) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .step_executions
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| missing("step execution", step.id))?;
        if stored.status.is_terminal() {
            return Err(finished("step execution", step.id));
        }
        *stored = step.clone();
        Ok(())
    }

    async fn find_run(&self, id: Uuid) -> Result<Option<PipelineExecution>> {
        let state = self.state.read().await;
        let Some(run) = state.runs.iter().find(|r| r.id == id) else {
            return Ok(None);
        };
        let mut run = run.clone();
        run.step_executions = state
            .step_executions
            .iter()
            .filter(|s| s.pipeline_execution_id == id)
            .cloned()
            .collect();
        run.step_executions.sort_by_key(|s| s.step_order);
        Ok(Some(run))
    }

    async fn list_runs(&self, pipeline_id: Uuid) -> Result<Vec<PipelineExecution>> {
        let ids: Vec<Uuid> = {
            let state = self.state.read().await;
            state
                .runs
                .iter()
                .rev()
                .filter(|r| r.pipeline_id == pipeline_id)
                .map(|r| r.id)
                .collect()
        };
        let mut runs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(run) = self.find_run(id).await? {
                runs.push(run);
            }
        }
        Ok(runs)
    }

    async fn delete_run(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed = remove_by_id(&mut state.runs, id, |r| r.id);
        if removed {
            state.step_executions.retain(|s| s.pipeline_execution_id != id);
        }
        Ok(removed)
    }

    async fn insert_generation(&self, record: &GenerationRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.generations.iter().any(|g| g.id == record.id) {
            return Err(duplicate("generation", record.id));
        }
        state.generations.push(record.clone());
        Ok(())
    }

    async fn update_generation(&self, record: &GenerationRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if replace_by_id(&mut state.generations, record.clone(), |g| g.id) {
            Ok(())
        } else {
            Err(missing("generation", record.id))
        }
    }

    async fn find_generation(&self, id: Uuid) -> Result<Option<GenerationRecord>> {
        let state = self.state.read().await;
        Ok(state.generations.iter().find(|g| g.id == id).cloned())
    }

    async fn list_generations(&self, owner: UserId) -> Result<Vec<GenerationRecord>> {
        let state = self.state.read().await;
        Ok(state
            .generations
            .iter()
            .rev()
            .filter(|g| g.owner == owner)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionStatus, PipelineStep, Variables};
    use chrono::Utc;

    fn step(pipeline_id: Uuid, order: u32) -> PipelineStep {
        PipelineStep {
            id: Uuid::new_v4(),
            pipeline_id,
            step_order: order,
            template_id: Uuid::new_v4(),
            provider: "mock".into(),
            model: "mock-model".into(),
            output_variable: format!("out{}", order),
        }
    }

    #[tokio::test]
    async fn test_find_run_orders_steps() {
        let store = MemoryStore::new();
        let pipeline_id = Uuid::new_v4();
        let run = PipelineExecution::start(pipeline_id, Uuid::new_v4(), &Variables::new()).unwrap();
        store.insert_run(&run).await.unwrap();

        let second = PipelineStepExecution::start(run.id, &step(pipeline_id, 2), Some("b".into()));
        let first = PipelineStepExecution::start(run.id, &step(pipeline_id, 1), Some("a".into()));
        store.insert_step_execution(&second).await.unwrap();
        store.insert_step_execution(&first).await.unwrap();

        let found = store.find_run(run.id).await.unwrap().unwrap();
        let orders: Vec<u32> = found.step_executions.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_run_cascades_step_records() {
        let store = MemoryStore::new();
        let pipeline_id = Uuid::new_v4();
        let run = PipelineExecution::start(pipeline_id, Uuid::new_v4(), &Variables::new()).unwrap();
        store.insert_run(&run).await.unwrap();
        let record = PipelineStepExecution::start(run.id, &step(pipeline_id, 1), None);
        store.insert_step_execution(&record).await.unwrap();
        assert_eq!(store.step_execution_count().await, 1);

        assert!(store.delete_run(run.id).await.unwrap());
        assert_eq!(store.run_count().await, 0);
        assert_eq!(store.step_execution_count().await, 0);
        assert!(!store.delete_run(run.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_step_execution_requires_run() {
        let store = MemoryStore::new();
        let record = PipelineStepExecution::start(Uuid::new_v4(), &step(Uuid::new_v4(), 1), None);
        let err = store.insert_step_execution(&record).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }

    #[tokio::test]
    async fn test_update_run_changes_status_only() {
        let store = MemoryStore::new();
        let mut run = PipelineExecution::start(Uuid::new_v4(), Uuid::new_v4(), &Variables::new()).unwrap();
        store.insert_run(&run).await.unwrap();
        run.finish(ExecutionStatus::Completed);
        store.update_run(&run).await.unwrap();

        let found = store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(found.status, ExecutionStatus::Completed);
        assert!(found.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_finished_records_reject_updates() {
        let store = MemoryStore::new();
        let mut run = PipelineExecution::start(Uuid::new_v4(), Uuid::new_v4(), &Variables::new()).unwrap();
        store.insert_run(&run).await.unwrap();
        let mut record = PipelineStepExecution::start(run.id, &step(run.pipeline_id, 1), Some("p".into()));
        store.insert_step_execution(&record).await.unwrap();

        record.fail("boom".into());
        store.update_step_execution(&record).await.unwrap();
        record.complete("late".into());
        assert!(matches!(
            store.update_step_execution(&record).await,
            Err(PipelineError::Storage(_))
        ));

        run.finish(ExecutionStatus::Failed);
        store.update_run(&run).await.unwrap();
        run.finish(ExecutionStatus::Completed);
        assert!(matches!(store.update_run(&run).await, Err(PipelineError::Storage(_))));

        let found = store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(found.status, ExecutionStatus::Failed);
        assert_eq!(found.step_executions[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let store = MemoryStore::new();
        let pipeline_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let a = PipelineExecution::start(pipeline_id, owner, &Variables::new()).unwrap();
        let b = PipelineExecution::start(pipeline_id, owner, &Variables::new()).unwrap();
        let other = PipelineExecution::start(Uuid::new_v4(), owner, &Variables::new()).unwrap();
        store.insert_run(&a).await.unwrap();
        store.insert_run(&b).await.unwrap();
        store.insert_run(&other).await.unwrap();

        let ids: Vec<Uuid> = store.list_runs(pipeline_id).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_template_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let template = Template {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            versions: vec![],
            created_at: Utc::now(),
            updated_at: None,
        };
        store.insert_template(template.clone()).await.unwrap();
        assert!(store.insert_template(template).await.is_err());
    }
}
