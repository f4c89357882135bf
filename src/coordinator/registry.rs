use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{OrchestratorError, Result};
use crate::models::{Agent, Task, Workflow};

/// Owns the Agent map. A single `RwLock` guards the whole map: readers take
/// the shared lock, mutators take the exclusive lock, and lock scope never
/// extends across an `.await` on I/O.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, agent: Agent) {
        self.agents.write().await.insert(agent.id.clone(), agent);
    }

    pub async fn remove(&self, agent_id: &str) -> Option<Agent> {
        self.agents.write().await.remove(agent_id)
    }

    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn list(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn update<F>(&self, agent_id: &str, f: F) -> Result<Agent>
    where
        F: FnOnce(&mut Agent),
    {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("agent {agent_id}")))?;
        f(agent);
        Ok(agent.clone())
    }

    /// Capability match: agents that are not Busy/Offline/Terminated/Error
    /// and advertise the requested capability, ordered by registration time
    /// so "first capable agent" is deterministic (§4.1 "stable ordering").
    pub async fn find_capable(&self, task_type: &str) -> Vec<Agent> {
        let mut matches: Vec<Agent> = self
            .agents
            .read()
            .await
            .values()
            .filter(|a| {
                matches!(a.status, crate::models::AgentStatus::Idle | crate::models::AgentStatus::Active)
                    && a.can_handle(task_type)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|a| a.created_at);
        matches
    }
}

/// Owns the Task map.
#[derive(Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn list(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub async fn update<F>(&self, task_id: &str, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("task {task_id}")))?;
        f(task)?;
        Ok(task.clone())
    }

    pub async fn tasks_for_agent_running(&self, agent_id: &str) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| {
                t.agent_id.as_deref() == Some(agent_id)
                    && t.status == crate::models::TaskStatus::Running
            })
            .cloned()
            .collect()
    }
}

/// Owns the Workflow map.
#[derive(Clone, Default)]
pub struct WorkflowStore {
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, workflow: Workflow) {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
    }

    pub async fn get(&self, workflow_id: &str) -> Option<Workflow> {
        self.workflows.read().await.get(workflow_id).cloned()
    }

    pub async fn list(&self) -> Vec<Workflow> {
        self.workflows.read().await.values().cloned().collect()
    }

    pub async fn update<F>(&self, workflow_id: &str, f: F) -> Result<Workflow>
    where
        F: FnOnce(&mut Workflow) -> Result<()>,
    {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("workflow {workflow_id}")))?;
        f(workflow)?;
        Ok(workflow.clone())
    }
}
