//! Workflow Engine: expands a Workflow into a dependency DAG of Tasks and
//! advances it as task results arrive. Driven entirely by the
//! Coordinator's event bus — it never polls.

pub mod dag;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::coordinator::events::Event;
use crate::coordinator::Coordinator;
use crate::models::{FailurePolicy, Task, TaskStatus, TaskSubmission, WorkflowStatus};

pub struct WorkflowEngine {
    coordinator: Arc<Coordinator>,
}

impl WorkflowEngine {
    pub fn new(coordinator: Arc<Coordinator>) -> Arc<Self> {
        Arc::new(Self { coordinator })
    }

    /// Subscribes to the Coordinator's event bus and advances every active
    /// workflow whenever a task it owns completes.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.coordinator.subscribe().await;
        while let Some(event) = events.recv().await {
            match event {
                Event::TaskCompleted { task_id, .. } => {
                    self.on_task_completed(&task_id).await;
                }
                Event::TaskTimeout { task_id } => {
                    self.on_task_completed(&task_id).await;
                }
                _ => {}
            }
        }
    }

    /// Submits the initial ready steps of a freshly-activated workflow.
    pub async fn execute(&self, workflow_id: &str) -> crate::error::Result<()> {
        self.coordinator.activate_workflow(workflow_id).await?;
        self.coordinator
            .counters
            .workflows_started
            .fetch_add(1, Ordering::Relaxed);
        self.advance(workflow_id).await;
        Ok(())
    }

    async fn on_task_completed(&self, task_id: &str) {
        let Ok(task) = self.coordinator.get_task(task_id).await else {
            return;
        };
        let Some(workflow_id) = task.workflow_id.clone() else {
            return;
        };
        self.advance(&workflow_id).await;
    }

    async fn advance(&self, workflow_id: &str) {
        let Ok(workflow) = self.coordinator.get_workflow(workflow_id).await else {
            return;
        };
        if workflow.status != WorkflowStatus::Active {
            return;
        }

        let mut completed: HashSet<String> = HashSet::new();
        let mut any_failed: Option<String> = None;
        for step in &workflow.steps {
            let Some(task_id) = &step.task_id else { continue };
            let Ok(task) = self.coordinator.get_task(task_id).await else {
                continue;
            };
            if task.status == TaskStatus::Completed {
                completed.insert(step.name.clone());
            } else if task.status.is_terminal() {
                any_failed.get_or_insert_with(|| step.name.clone());
            }
        }

        if let Some(failed_step) = &any_failed {
            if workflow.config.failure_policy == FailurePolicy::FailFast {
                let _ = self
                    .coordinator
                    .workflows
                    .update(workflow_id, |w| {
                        w.status = WorkflowStatus::Failed;
                        w.touch();
                        Ok(())
                    })
                    .await;
                self.coordinator
                    .counters
                    .workflows_failed
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }

            let cascaded = dag::downstream_of(&workflow.steps, failed_step);
            for name in &cascaded {
                completed.remove(name);
            }

            // Each cascaded step gets a real Cancelled Task, not just a
            // status flip on the step, so it shows up via list_tasks for the
            // workflow like any other step (§4.3, §7).
            let mut cancelled: Vec<(String, String)> = Vec::new();
            for step in &workflow.steps {
                if cascaded.contains(&step.name) && step.task_id.is_none() {
                    let submission = TaskSubmission {
                        task_type: step.task_type.clone(),
                        priority: 0,
                        payload: step.payload.clone(),
                        agent_id: step.agent_id.clone(),
                        workflow_id: Some(workflow_id.to_string()),
                        step_index: workflow.steps.iter().position(|s| s.name == step.name),
                        timeout_secs: step.timeout_secs,
                    };
                    let mut task = Task::new(submission, crate::constants::DEFAULT_TASK_TIMEOUT);
                    task.mark_terminal(
                        TaskStatus::Cancelled,
                        Default::default(),
                        Some(format!("upstream step '{failed_step}' failed")),
                    );
                    let task_id = task.id.clone();
                    self.coordinator.tasks.insert(task).await;
                    cancelled.push((step.name.clone(), task_id));
                }
            }

            let _ = self
                .coordinator
                .workflows
                .update(workflow_id, |w| {
                    for (step_name, task_id) in &cancelled {
                        if let Some(step) = w.steps.iter_mut().find(|s| &s.name == step_name) {
                            step.task_id = Some(task_id.clone());
                        }
                    }
                    Ok(())
                })
                .await;
        }

        let ready: Vec<_> = dag::ready_steps(&workflow.steps, &completed)
            .into_iter()
            .map(|s| s.name.clone())
            .collect();

        for step_name in ready {
            self.submit_step(workflow_id, &step_name).await;
        }

        // `maybe_complete` re-derives terminality from the task store itself
        // and is a no-op unless every step is either dispatched-and-terminal
        // or cascade-skipped, so it's safe to probe on every advance.
        self.maybe_complete(workflow_id).await;
    }

    async fn submit_step(&self, workflow_id: &str, step_name: &str) {
        let Ok(workflow) = self.coordinator.get_workflow(workflow_id).await else {
            return;
        };
        let Some(step) = workflow.steps.iter().find(|s| s.name == step_name) else {
            return;
        };
        if step.task_id.is_some() {
            return;
        }

        let submission = TaskSubmission {
            task_type: step.task_type.clone(),
            priority: 0,
            payload: step.payload.clone(),
            agent_id: step.agent_id.clone(),
            workflow_id: Some(workflow_id.to_string()),
            step_index: workflow.steps.iter().position(|s| s.name == step_name),
            timeout_secs: step.timeout_secs,
        };

        match self.coordinator.submit_task(submission).await {
            Ok(task) => {
                let _ = self
                    .coordinator
                    .workflows
                    .update(workflow_id, |w| {
                        if let Some(s) = w.steps.iter_mut().find(|s| s.name == step_name) {
                            s.task_id = Some(task.id.clone());
                        }
                        Ok(())
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(workflow_id, step_name, "failed to submit workflow step: {e}");
            }
        }
    }

    async fn maybe_complete(&self, workflow_id: &str) {
        let Ok(workflow) = self.coordinator.get_workflow(workflow_id).await else {
            return;
        };
        let mut saw_failure = false;
        for step in &workflow.steps {
            let Some(task_id) = &step.task_id else {
                return;
            };
            let Ok(task) = self.coordinator.get_task(task_id).await else {
                return;
            };
            if !task.status.is_terminal() {
                return;
            }
            if task.status != TaskStatus::Completed {
                saw_failure = true;
            }
        }

        let final_status = if saw_failure {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };
        let _ = self
            .coordinator
            .workflows
            .update(workflow_id, |w| {
                w.status = final_status;
                w.touch();
                Ok(())
            })
            .await;
        let counter = if saw_failure {
            &self.coordinator.counters.workflows_failed
        } else {
            &self.coordinator.counters.workflows_completed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
