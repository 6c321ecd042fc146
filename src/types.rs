use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Identity of an already-authenticated caller.
pub type UserId = Uuid;

/// Mapping from variable name to value.
pub type Variables = HashMap<String, String>;

/// Serialize a variable mapping as JSON with keys in sorted order, so equal
/// mappings always produce the same snapshot.
pub(crate) fn snapshot_variables(variables: &Variables) -> serde_json::Result<String> {
    let sorted: BTreeMap<&String, &String> = variables.iter().collect();
    serde_json::to_string(&sorted)
}

/// Lifecycle status shared by pipeline runs, step runs and single-template runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Declared for single-template records; pipeline runs start in `Running`.
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// An immutable snapshot of template content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: Uuid,
    pub template_id: Uuid,
    /// Starts at 1, strictly increasing per template.
    pub version_number: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A named prompt template with its version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub owner: UserId,
    pub name: String,
    pub description: Option<String>,
    pub versions: Vec<TemplateVersion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Template {
    /// The version with the highest version number.
    pub fn latest_version(&self) -> Option<&TemplateVersion> {
        self.versions.iter().max_by_key(|v| v.version_number)
    }

    /// Number the next appended version will receive.
    pub fn next_version_number(&self) -> u32 {
        self.versions
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Content of a template's latest version, as seen by one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub template_id: Uuid,
    pub version_id: Uuid,
    pub version_number: u32,
    pub content: String,
}

/// One position in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    /// 1-based position; contiguous within a pipeline.
    pub step_order: u32,
    pub template_id: Uuid,
    pub provider: String,
    pub model: String,
    /// Context key this step's output is bound to.
    pub output_variable: String,
}

/// An ordered sequence of template invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub owner: UserId,
    pub name: String,
    pub description: Option<String>,
    /// Kept sorted by `step_order`.
    pub steps: Vec<PipelineStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// Steps in execution order.
    pub fn ordered_steps(&self) -> Vec<&PipelineStep> {
        let mut steps: Vec<&PipelineStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }
}

/// One run of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    /// Caller that started the run.
    pub owner: UserId,
    pub status: ExecutionStatus,
    /// Initial variable mapping, serialized as JSON.
    pub variables: String,
    pub created_at: DateTime<Utc>,
    /// Set only once `status` is terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// One record per attempted step, in step order.
    pub step_executions: Vec<PipelineStepExecution>,
}

impl PipelineExecution {
    pub(crate) fn start(pipeline_id: Uuid, owner: UserId, variables: &Variables) -> serde_json::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            pipeline_id,
            owner,
            status: ExecutionStatus::Running,
            variables: snapshot_variables(variables)?,
            created_at: Utc::now(),
            completed_at: None,
            step_executions: Vec::new(),
        })
    }

    pub(crate) fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Decode the captured initial variables.
    pub fn initial_variables(&self) -> serde_json::Result<Variables> {
        serde_json::from_str(&self.variables)
    }
}

/// Record of one attempted pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepExecution {
    pub id: Uuid,
    pub pipeline_execution_id: Uuid,
    pub pipeline_step_id: Uuid,
    /// Copied from the step so ordering survives later edits.
    pub step_order: u32,
    /// Prompt actually sent; absent when the step failed before a prompt existed.
    pub input_prompt: Option<String>,
    pub output: Option<String>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineStepExecution {
    pub(crate) fn start(run_id: Uuid, step: &PipelineStep, input_prompt: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_execution_id: run_id,
            pipeline_step_id: step.id,
            step_order: step.step_order,
            input_prompt,
            output: None,
            status: ExecutionStatus::Running,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub(crate) fn complete(&mut self, output: String) {
        self.output = Some(output);
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }
}

/// Record of a single-template generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub template_id: Uuid,
    pub template_name: String,
    pub template_version_id: Uuid,
    pub template_version_number: u32,
    pub owner: UserId,
    pub provider: String,
    pub model: String,
    /// Variable mapping serialized as JSON.
    pub variables: String,
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(template_id: Uuid, n: u32, content: &str) -> TemplateVersion {
        TemplateVersion {
            id: Uuid::new_v4(),
            template_id,
            version_number: n,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_latest_version_is_max_number_not_last_pushed() {
        let id = Uuid::new_v4();
        let template = Template {
            id,
            owner: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            versions: vec![version(id, 1, "one"), version(id, 3, "three"), version(id, 2, "two")],
            created_at: Utc::now(),
            updated_at: None,
        };
        assert_eq!(template.latest_version().unwrap().content, "three");
        assert_eq!(template.next_version_number(), 4);
    }

    #[test]
    fn test_next_version_number_empty() {
        let template = Template {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            name: "t".into(),
            description: None,
            versions: vec![],
            created_at: Utc::now(),
            updated_at: None,
        };
        assert!(template.latest_version().is_none());
        assert_eq!(template.next_version_number(), 1);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ExecutionStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_run_captures_variables() {
        let vars = Variables::from([("text".to_string(), "Bonjour".to_string())]);
        let run = PipelineExecution::start(Uuid::new_v4(), Uuid::new_v4(), &vars).unwrap();
        assert_eq!(run.status, ExecutionStatus::Running);
        assert!(run.completed_at.is_none());
        assert_eq!(run.initial_variables().unwrap(), vars);
    }

    #[test]
    fn test_variable_snapshot_is_key_sorted() {
        let mut forward = Variables::new();
        let mut backward = Variables::new();
        for key in ["zeta", "alpha", "mid", "beta", "omega", "kappa"] {
            forward.insert(key.to_string(), key.to_uppercase());
        }
        for key in ["kappa", "omega", "beta", "mid", "alpha", "zeta"] {
            backward.insert(key.to_string(), key.to_uppercase());
        }

        let a = PipelineExecution::start(Uuid::new_v4(), Uuid::new_v4(), &forward).unwrap();
        let b = PipelineExecution::start(Uuid::new_v4(), Uuid::new_v4(), &backward).unwrap();
        assert_eq!(a.variables, b.variables);
        assert_eq!(
            a.variables,
            r#"{"alpha":"ALPHA","beta":"BETA","kappa":"KAPPA","mid":"MID","omega":"OMEGA","zeta":"ZETA"}"#
        );
        assert_eq!(a.initial_variables().unwrap(), forward);
    }
}
