//! Coordinator: the single authoritative arbiter of Agent/Task/Workflow
//! state. Every mutation of those three maps goes through a method on
//! [`Coordinator`]; nothing else is permitted to write them directly.

pub mod events;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod sweeper;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use crate::config::CoordinatorConfig;
use crate::error::{OrchestratorError, Result};
use crate::models::{
    Agent, AgentRegistration, AgentStatus, Task, TaskStatus, TaskSubmission, Workflow,
    WorkflowStatus, WorkflowSubmission,
};

use events::{Event, EventBus};
use metrics::Counters;
use queue::PendingQueue;
use registry::{AgentRegistry, TaskStore, WorkflowStore};

/// Implemented by the Agent Manager. The Coordinator depends on this trait,
/// not on the Agent Manager's concrete type, so the matching pass can hand
/// off a task without owning anything about dispatch or transport.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Non-blocking push onto the target agent's inbox. Returns `Err` if
    /// the inbox is full or the agent is unknown to the Agent Manager; the
    /// Coordinator leaves the task Pending on this outcome.
    async fn dispatch(&self, agent_id: &str, task: Task) -> Result<()>;

    /// Best-effort cancellation signal to the owning agent. Never blocks
    /// the caller and never fails loudly — cancellation is cooperative.
    async fn notify_cancel(&self, agent_id: &str, task_id: &str);
}

pub struct Coordinator {
    pub(crate) agents: AgentRegistry,
    pub(crate) tasks: TaskStore,
    pub(crate) workflows: WorkflowStore,
    pending: PendingQueue,
    pub(crate) events: EventBus,
    config: CoordinatorConfig,
    dispatcher: RwLock<Option<Arc<dyn Dispatcher>>>,
    matcher_notify: Notify,
    shutdown: AtomicBool,
    pub(crate) counters: Arc<Counters>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Arc<Self> {
        Arc::new(Self {
            agents: AgentRegistry::new(),
            tasks: TaskStore::new(),
            workflows: WorkflowStore::new(),
            pending: PendingQueue::new(config.admission_queue_size),
            events: EventBus::new(),
            config,
            dispatcher: RwLock::new(None),
            matcher_notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Wires the Agent Manager in after construction, breaking the
    /// otherwise-circular initialization order (Agent Manager needs a
    /// handle to the Coordinator; the Coordinator needs a handle to the
    /// Agent Manager's dispatch).
    pub async fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        *self.dispatcher.write().await = Some(dispatcher);
    }

    pub async fn subscribe(&self) -> tokio::sync::mpsc::Receiver<Event> {
        self.events.subscribe().await
    }

    fn wake_matcher(&self) {
        self.matcher_notify.notify_one();
    }

    pub(crate) async fn notify_cancel(&self, agent_id: &str, task_id: &str) {
        if let Some(dispatcher) = self.dispatcher.read().await.clone() {
            dispatcher.notify_cancel(agent_id, task_id).await;
        }
    }

    // ---- Agent operations ----------------------------------------------

    pub async fn register_agent(&self, registration: AgentRegistration) -> Agent {
        let agent = Agent::new(registration);
        self.agents.insert(agent.clone()).await;
        self.counters.agents_registered.fetch_add(1, Ordering::Relaxed);
        self.events
            .publish(Event::AgentRegistered {
                agent_id: agent.id.clone(),
            })
            .await;
        self.wake_matcher();
        agent
    }

    /// Unknown ids are silently ignored, per spec.
    pub async fn unregister_agent(&self, agent_id: &str) {
        if self.agents.remove(agent_id).await.is_none() {
            return;
        }
        self.counters.agents_unregistered.fetch_add(1, Ordering::Relaxed);
        let running = self.tasks.tasks_for_agent_running(agent_id).await;
        for task in running {
            let task_id = task.id.clone();
            let _ = self
                .tasks
                .update(&task_id, |t| {
                    t.mark_terminal(
                        TaskStatus::Failed,
                        Default::default(),
                        Some("agent_lost".to_string()),
                    );
                    Ok(())
                })
                .await;
            self.counters.tasks_failed.fetch_add(1, Ordering::Relaxed);
            self.events
                .publish(Event::TaskCompleted {
                    task_id,
                    status: TaskStatus::Failed,
                })
                .await;
        }
        self.events
            .publish(Event::AgentUnregistered {
                agent_id: agent_id.to_string(),
            })
            .await;
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        self.agents
            .get(agent_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("agent {agent_id}")))
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.agents.list().await
    }

    pub async fn update_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<Agent> {
        let agent = self
            .agents
            .update(agent_id, |a| {
                a.set_status(status);
                a.touch();
            })
            .await?;
        self.events
            .publish(Event::AgentStatusChanged {
                agent_id: agent_id.to_string(),
                status,
            })
            .await;
        self.wake_matcher();
        Ok(agent)
    }

    pub async fn touch_agent(&self, agent_id: &str) -> Result<()> {
        self.agents.update(agent_id, |a| a.touch()).await?;
        Ok(())
    }

    // ---- Task operations ------------------------------------------------

    pub async fn submit_task(&self, submission: TaskSubmission) -> Result<Task> {
        let task = Task::new(submission, self.config.task_timeout_default);
        self.pending.push(task.id.clone()).await?;
        self.tasks.insert(task.clone()).await;
        self.counters.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        self.events
            .publish(Event::TaskSubmitted {
                task_id: task.id.clone(),
            })
            .await;
        self.wake_matcher();
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .get(task_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("task {task_id}")))
    }

    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        agent_id: Option<&str>,
        workflow_id: Option<&str>,
    ) -> Vec<Task> {
        self.tasks
            .list()
            .await
            .into_iter()
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .filter(|t| agent_id.map(|id| t.agent_id.as_deref() == Some(id)).unwrap_or(true))
            .filter(|t| workflow_id.map(|id| t.workflow_id.as_deref() == Some(id)).unwrap_or(true))
            .collect()
    }

    pub async fn complete_task(
        &self,
        task_id: &str,
        success: bool,
        result: HashMap<String, String>,
        error: Option<String>,
    ) -> Result<Task> {
        let current = self.get_task(task_id).await?;
        if current.status.is_terminal() {
            // First completion wins; a duplicate is logged and ignored,
            // not an error.
            tracing::debug!(task_id, "ignoring completion for already-terminal task");
            return Ok(current);
        }
        if current.status != TaskStatus::Running {
            return Err(OrchestratorError::InvalidState(format!(
                "task {task_id} is not running"
            )));
        }

        let status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let updated = self
            .tasks
            .update(task_id, |t| {
                t.mark_terminal(status, result, error);
                Ok(())
            })
            .await?;

        if success {
            self.counters.tasks_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(agent_id) = updated.agent_id.clone() {
            let still_busy = !self
                .tasks
                .tasks_for_agent_running(&agent_id)
                .await
                .is_empty();
            if !still_busy {
                let _ = self
                    .agents
                    .update(&agent_id, |a| a.set_status(AgentStatus::Idle))
                    .await;
            }
        }

        self.events
            .publish(Event::TaskCompleted {
                task_id: task_id.to_string(),
                status,
            })
            .await;
        self.wake_matcher();
        Ok(updated)
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<Task> {
        let current = self.get_task(task_id).await?;
        if current.status.is_terminal() {
            return Err(OrchestratorError::InvalidState(format!(
                "task {task_id} is already terminal"
            )));
        }

        let was_running = current.status == TaskStatus::Running;
        let updated = self
            .tasks
            .update(task_id, |t| {
                t.mark_terminal(TaskStatus::Cancelled, Default::default(), None);
                Ok(())
            })
            .await?;
        self.pending.remove(task_id).await;

        if was_running {
            if let Some(agent_id) = updated.agent_id.clone() {
                self.notify_cancel(&agent_id, task_id).await;
                let _ = self
                    .agents
                    .update(&agent_id, |a| a.set_status(AgentStatus::Idle))
                    .await;
            }
        }

        self.events
            .publish(Event::TaskCancelled {
                task_id: task_id.to_string(),
            })
            .await;
        Ok(updated)
    }

    // ---- Workflow operations --------------------------------------------

    pub async fn submit_workflow(&self, submission: WorkflowSubmission) -> Result<Workflow> {
        validate_acyclic(&submission)?;
        let workflow = Workflow::new(submission);
        self.workflows.insert(workflow.clone()).await;
        Ok(workflow)
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        self.workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("workflow {workflow_id}")))
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.workflows.list().await
    }

    /// Marks a Draft workflow Active. The Workflow Engine observes this
    /// transition (via polling `list_workflows`/`get_workflow`, since
    /// workflow advancement is driven by task-completion events rather
    /// than by the Coordinator itself) and submits the initial ready
    /// steps.
    pub async fn activate_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        self.workflows
            .update(workflow_id, |w| {
                if w.status != WorkflowStatus::Draft {
                    return Err(OrchestratorError::InvalidState(format!(
                        "workflow {} is not a draft",
                        w.id
                    )));
                }
                w.status = WorkflowStatus::Active;
                w.touch();
                Ok(())
            })
            .await
    }

    // ---- Matching pass ----------------------------------------------------

    /// Runs until `shutdown` is signalled. Wakes on `matcher_notify` (a
    /// registration, submission, completion, or status change) and falls
    /// back to a short interval tick so a transient missed wakeup cannot
    /// stall matching indefinitely.
    pub async fn run_matcher(self: Arc<Self>) {
        let mut fallback = tokio::time::interval(std::time::Duration::from_millis(200));
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            tokio::select! {
                _ = self.matcher_notify.notified() => {}
                _ = fallback.tick() => {}
            }
            self.run_matching_pass().await;
        }
    }

    async fn run_matching_pass(&self) {
        let Some(dispatcher) = self.dispatcher.read().await.clone() else {
            return;
        };

        let pending_ids = self.pending.snapshot().await;
        if pending_ids.is_empty() {
            return;
        }

        let mut candidates = Vec::new();
        for id in pending_ids {
            if let Some(task) = self.tasks.get(&id).await {
                if task.status == TaskStatus::Pending {
                    candidates.push(task);
                } else {
                    self.pending.remove(&id).await;
                }
            } else {
                self.pending.remove(&id).await;
            }
        }
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        let mut claimed: HashSet<String> = HashSet::new();
        for task in candidates {
            let agent = if let Some(agent_id) = &task.agent_id {
                if claimed.contains(agent_id) {
                    continue;
                }
                match self.agents.get(agent_id).await {
                    Some(a) if a.status == AgentStatus::Idle || a.status == AgentStatus::Active => {
                        Some(a)
                    }
                    _ => None,
                }
            } else {
                let capable = self.agents.find_capable(&task.task_type).await;
                capable
                    .into_iter()
                    .find(|a| !claimed.contains(&a.id))
            };

            let Some(agent) = agent else {
                continue;
            };

            if dispatcher.dispatch(&agent.id, task.clone()).await.is_err() {
                // Inbox full or agent gone: leave the task Pending and
                // parked, try again on the next pass.
                continue;
            }

            claimed.insert(agent.id.clone());
            self.pending.remove(&task.id).await;
            let _ = self
                .tasks
                .update(&task.id, |t| {
                    t.mark_running(agent.id.clone());
                    Ok(())
                })
                .await;
            let _ = self
                .agents
                .update(&agent.id, |a| a.set_status(AgentStatus::Busy))
                .await;
            self.events
                .publish(Event::TaskAssigned {
                    task_id: task.id.clone(),
                    agent_id: agent.id.clone(),
                })
                .await;
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Kahn's algorithm: rejects the workflow if any step cannot be reached by
/// repeatedly removing zero-in-degree nodes, i.e. a dependency cycle exists.
fn validate_acyclic(submission: &WorkflowSubmission) -> Result<()> {
    let names: HashSet<&str> = submission.steps.iter().map(|s| s.name.as_str()).collect();
    for step in &submission.steps {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(OrchestratorError::Invalid(format!(
                    "step {} depends on unknown step {}",
                    step.name, dep
                )));
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = submission
        .steps
        .iter()
        .map(|s| (s.name.as_str(), s.depends_on.len()))
        .collect();
    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0usize;

    while let Some(name) = queue.pop() {
        visited += 1;
        for step in &submission.steps {
            if step.depends_on.contains(name) {
                let entry = in_degree.get_mut(step.name.as_str()).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push(step.name.as_str());
                }
            }
        }
    }

    if visited != submission.steps.len() {
        return Err(OrchestratorError::Invalid(
            "workflow step dependencies contain a cycle".to_string(),
        ));
    }
    Ok(())
}
