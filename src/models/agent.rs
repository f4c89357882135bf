use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Active,
    Busy,
    Offline,
    Error,
    Terminated,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
            AgentStatus::Error => "error",
            AgentStatus::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// A long-lived worker connected to the orchestrator over the real-time
/// channel, advertising a set of capabilities and accepting dispatched
/// tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub status: AgentStatus,
    pub capabilities: HashSet<String>,
    pub config: HashMap<String, String>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

/// Caller-supplied descriptor used to register a new agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRegistration {
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub capabilities: HashSet<String>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl Agent {
    pub fn new(registration: AgentRegistration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: registration.name,
            agent_type: registration.agent_type,
            status: AgentStatus::Idle,
            capabilities: registration.capabilities,
            config: registration.config,
            last_seen: now,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn can_handle(&self, task_type: &str) -> bool {
        self.capabilities.contains(task_type)
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
        self.updated_at = self.last_seen;
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
