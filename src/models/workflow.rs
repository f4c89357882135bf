use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One step of a workflow's dependency DAG. A step produces a Task once
/// every entry in `depends_on` has reached a terminal, successful state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub payload: HashMap<String, String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub depends_on: HashSet<String>,
    /// Populated once the step's task has been submitted to the Coordinator.
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Behavior when a step fails: stop the whole workflow, or let independent
/// branches continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailFast,
    ContinueOnError,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Reserved extension point; no automatic retry is implemented, retry
    /// is a workflow-step concern per the Coordinator's failure semantics.
    #[serde(default)]
    pub max_step_retries: u32,
}

/// A declarative, DAG-shaped collection of steps; each step, when
/// eligible, produces a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub config: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSubmission {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub config: WorkflowConfig,
}

impl Workflow {
    pub fn new(submission: WorkflowSubmission) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: submission.name,
            description: submission.description,
            steps: submission.steps,
            status: WorkflowStatus::Draft,
            created_at: now,
            updated_at: now,
            config: submission.config,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
