use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a dispatchable unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    /// Terminal statuses never transition further (property 1, state
    /// monotonicity).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::TimedOut
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// A single unit of dispatchable work with a type, payload, priority and
/// timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub payload: HashMap<String, String>,
    #[serde(default)]
    pub result: HashMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "duration_secs")]
    pub timeout: StdDuration,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub step_index: Option<usize>,
}

/// Caller-supplied fields used to submit a new task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSubmission {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub payload: HashMap<String, String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub step_index: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Task {
    pub fn new(submission: TaskSubmission, default_timeout: StdDuration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: submission.agent_id,
            task_type: submission.task_type,
            priority: submission.priority,
            status: TaskStatus::Pending,
            payload: submission.payload,
            result: HashMap::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            timeout: submission
                .timeout_secs
                .map(StdDuration::from_secs)
                .unwrap_or(default_timeout),
            workflow_id: submission.workflow_id,
            step_index: submission.step_index,
        }
    }

    pub fn mark_running(&mut self, agent_id: String) {
        self.agent_id = Some(agent_id);
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_terminal(&mut self, status: TaskStatus, result: HashMap<String, String>, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.result = result;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
