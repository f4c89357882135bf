use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a Schedule synthesizes when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTargetType {
    Task,
    Workflow,
}

/// A cron-driven rule that periodically synthesizes a task or workflow
/// submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub target_type: ScheduleTargetType,
    /// The task or workflow submission, carried opaquely as JSON until the
    /// schedule fires and the Scheduler deserializes it into the concrete
    /// submission type for its `target_type`.
    pub target_payload: serde_json::Value,
    pub cron: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSubmission {
    pub name: String,
    pub target_type: ScheduleTargetType,
    pub target_payload: serde_json::Value,
    pub cron: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Schedule {
    pub fn new(submission: ScheduleSubmission) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: submission.name,
            target_type: submission.target_type,
            target_payload: submission.target_payload,
            cron: submission.cron,
            enabled: submission.enabled,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        }
    }
}
