//! Pipeline execution.
//!
//! [`PipelineExecutor::execute`] runs the steps of a pipeline strictly in
//! order. Each step resolves the latest version of its template at the moment
//! it runs, substitutes the run's context into it, records a `Running` step
//! record, invokes generation, and binds the output to the step's
//! `output_variable` for the steps after it.
//!
//! The first failed step ends the run: the step and the run are marked
//! `Failed` and later steps get no record at all.
//!
//! ```text
//! execute ──► PipelineNotFound? ──► run: Running
//!                                     │
//!              ┌──────────────────────┘
//!              ▼
//!   resolve template ─► substitute ─► step: Running ─► invoke
//!              │             │                           │
//!              └─ preparation failure                    ├─ ok:  step Completed, context[out] = text
//!                 (policy decides)                       └─ err: step Failed ─► run Failed
//!
//! all steps completed ─► run Completed
//! ```

use crate::error::Result;
use crate::events::{emit, Event, EventHandler};
use crate::invoker::GenerationInvoker;
use crate::pipelines::PipelineService;
use crate::store::ExecutionStore;
use crate::substitution::substitute;
use crate::templates::TemplateService;
use crate::types::{
    ExecutionStatus, PipelineExecution, PipelineStep, PipelineStepExecution, UserId, Variables,
};
use crate::PipelineError;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// How the executor treats a step whose prompt cannot be built because its
/// template is gone, has no versions, or references a missing variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPreparationPolicy {
    /// Record the step as `Failed` (without an input prompt), mark the run
    /// `Failed`, and return the run.
    #[default]
    RecordFailure,
    /// Return the error to the caller. The run stays `Running` and the
    /// failing step has no record.
    AbortRequest,
}

/// Result of one attempted step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed(String),
    Failed(String),
}

/// Runs pipelines and keeps their execution records.
pub struct PipelineExecutor {
    pipelines: PipelineService,
    templates: TemplateService,
    executions: Arc<dyn ExecutionStore>,
    invoker: GenerationInvoker,
    policy: StepPreparationPolicy,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("invoker", &self.invoker)
            .field("policy", &self.policy)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl PipelineExecutor {
    pub fn new(
        pipelines: PipelineService,
        templates: TemplateService,
        executions: Arc<dyn ExecutionStore>,
        invoker: GenerationInvoker,
    ) -> Self {
        Self {
            pipelines,
            templates,
            executions,
            invoker,
            policy: StepPreparationPolicy::default(),
            event_handler: None,
        }
    }

    pub fn with_policy(mut self, policy: StepPreparationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Run a pipeline against `variables` on behalf of `caller`.
    ///
    /// Returns the run in `Completed` or `Failed` state. An `Err` means the
    /// request itself failed: the pipeline is not visible to the caller (no
    /// run is created), storage failed, or a preparation failure occurred
    /// under [`StepPreparationPolicy::AbortRequest`].
    #[tracing::instrument(skip(self, variables), fields(run_id = tracing::field::Empty))]
    pub async fn execute(
        &self,
        pipeline_id: Uuid,
        variables: Variables,
        caller: UserId,
    ) -> Result<PipelineExecution> {
        let pipeline = self.pipelines.get(pipeline_id, caller).await?;

        let mut run = PipelineExecution::start(pipeline.id, caller, &variables)?;
        self.executions.insert_run(&run).await?;
        tracing::Span::current().record("run_id", tracing::field::display(run.id));
        tracing::info!(
            "Pipeline run started: {} ({} steps)",
            pipeline.name,
            pipeline.steps.len()
        );
        emit(
            &self.event_handler,
            Event::RunStarted {
                run_id: run.id,
                pipeline_id: pipeline.id,
            },
        );

        let mut context = variables;
        for step in pipeline.ordered_steps() {
            match self.run_step(&mut run, step, &context, caller).await? {
                StepOutcome::Completed(output) => {
                    context.insert(step.output_variable.clone(), output);
                }
                StepOutcome::Failed(message) => {
                    tracing::warn!("Step {} failed: {}", step.step_order, message);
                    return self.finish(run, ExecutionStatus::Failed).await;
                }
            }
        }

        self.finish(run, ExecutionStatus::Completed).await
    }

    async fn run_step(
        &self,
        run: &mut PipelineExecution,
        step: &PipelineStep,
        context: &Variables,
        caller: UserId,
    ) -> Result<StepOutcome> {
        tracing::debug!(
            "Step {}: template {} via {}/{}",
            step.step_order,
            step.template_id,
            step.provider,
            step.model
        );

        let prompt = match self.prepare_prompt(step, context, caller).await {
            Ok(prompt) => prompt,
            Err(e) if is_preparation_error(&e) && self.policy == StepPreparationPolicy::RecordFailure => {
                let record = self.open_step(run, step, None).await?;
                return self.close_step(run, record, Err(e)).await;
            }
            Err(e) => return Err(e),
        };

        let record = self.open_step(run, step, Some(prompt.clone())).await?;
        emit(
            &self.event_handler,
            Event::StepStarted {
                run_id: run.id,
                step_order: step.step_order,
                provider: step.provider.clone(),
                model: step.model.clone(),
            },
        );
        let generated = self
            .invoker
            .invoke(&prompt, &step.provider, &step.model)
            .await;
        self.close_step(run, record, generated).await
    }

    async fn prepare_prompt(
        &self,
        step: &PipelineStep,
        context: &Variables,
        caller: UserId,
    ) -> Result<String> {
        let template = self.templates.resolve_latest(step.template_id, caller).await?;
        substitute(&template.content, context)
    }

    /// Write the `Running` record for a step before anything else happens to it.
    async fn open_step(
        &self,
        run: &PipelineExecution,
        step: &PipelineStep,
        prompt: Option<String>,
    ) -> Result<PipelineStepExecution> {
        let record = PipelineStepExecution::start(run.id, step, prompt);
        self.executions.insert_step_execution(&record).await?;
        Ok(record)
    }

    async fn close_step(
        &self,
        run: &mut PipelineExecution,
        mut record: PipelineStepExecution,
        result: Result<String>,
    ) -> Result<StepOutcome> {
        let outcome = match result {
            Ok(output) => {
                record.complete(output.clone());
                StepOutcome::Completed(output)
            }
            Err(e) => {
                let message = e.to_string();
                record.fail(message.clone());
                StepOutcome::Failed(message)
            }
        };
        self.executions.update_step_execution(&record).await?;
        emit(
            &self.event_handler,
            Event::StepFinished {
                run_id: run.id,
                step_order: record.step_order,
                ok: matches!(outcome, StepOutcome::Completed(_)),
            },
        );
        run.step_executions.push(record);
        Ok(outcome)
    }

    async fn finish(
        &self,
        mut run: PipelineExecution,
        status: ExecutionStatus,
    ) -> Result<PipelineExecution> {
        run.finish(status);
        self.executions.update_run(&run).await?;
        tracing::info!(
            "Pipeline run finished: {:?} after {} steps",
            status,
            run.step_executions.len()
        );
        emit(
            &self.event_handler,
            Event::RunFinished {
                run_id: run.id,
                status,
            },
        );
        Ok(run)
    }

    /// Fetch a run started by `caller`.
    pub async fn get_run(&self, id: Uuid, caller: UserId) -> Result<Option<PipelineExecution>> {
        Ok(self
            .executions
            .find_run(id)
            .await?
            .filter(|r| r.owner == caller))
    }

    /// Runs of a caller-visible pipeline started by `caller`, newest first.
    pub async fn list_runs(&self, pipeline_id: Uuid, caller: UserId) -> Result<Vec<PipelineExecution>> {
        let pipeline = self.pipelines.get(pipeline_id, caller).await?;
        let runs = self.executions.list_runs(pipeline.id).await?;
        Ok(runs.into_iter().filter(|r| r.owner == caller).collect())
    }

    /// Delete a run and its step records. Returns `false` if not visible.
    pub async fn delete_run(&self, id: Uuid, caller: UserId) -> Result<bool> {
        if self.get_run(id, caller).await?.is_none() {
            return Ok(false);
        }
        self.executions.delete_run(id).await
    }
}

/// Template resolution and substitution failures. Storage errors are not.
fn is_preparation_error(err: &PipelineError) -> bool {
    err.is_definitional() || matches!(err, PipelineError::MissingVariable(_))
}
