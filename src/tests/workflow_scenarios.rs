//! Workflow DAG advancement, exercised through the real `WorkflowEngine`
//! against a `Coordinator` wired to a fake dispatcher.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::CoordinatorConfig;
use crate::coordinator::{Coordinator, Dispatcher};
use crate::error::Result;
use crate::models::{
    AgentRegistration, FailurePolicy, Task, WorkflowConfig, WorkflowStep, WorkflowSubmission,
};
use crate::workflow_engine::WorkflowEngine;

#[derive(Default)]
struct RecordingDispatcher {
    dispatched: Mutex<Vec<(String, Task)>>,
}

impl RecordingDispatcher {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn tasks_for(&self, task_type: &str) -> Vec<Task> {
        self.dispatched
            .lock()
            .await
            .iter()
            .filter(|(_, t)| t.task_type == task_type)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, agent_id: &str, task: Task) -> Result<()> {
        self.dispatched.lock().await.push((agent_id.to_string(), task));
        Ok(())
    }

    async fn notify_cancel(&self, _agent_id: &str, _task_id: &str) {}
}

fn step(name: &str, task_type: &str, depends_on: &[&str]) -> WorkflowStep {
    WorkflowStep {
        name: name.to_string(),
        task_type: task_type.to_string(),
        payload: HashMap::new(),
        agent_id: None,
        timeout_secs: None,
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        task_id: None,
    }
}

async fn wait_until<F>(mut check: F, timeout: Duration)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// s1 -> {s2, s3}. Both s2 and s3 become ready in the same round once s1
/// completes; the workflow finishes once both complete.
#[tokio::test]
async fn s4_workflow_fans_out_after_shared_dependency() {
    let coordinator = Coordinator::new(CoordinatorConfig {
        admission_queue_size: 1000,
        task_timeout_default: Duration::from_secs(30),
        timeout_sweep_interval: Duration::from_secs(30),
    });
    let dispatcher = RecordingDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    for (name, capability) in [("a1", "a"), ("b1", "b"), ("c1", "c")] {
        coordinator
            .register_agent(AgentRegistration {
                name: name.to_string(),
                agent_type: "worker".to_string(),
                capabilities: HashSet::from([capability.to_string()]),
                config: HashMap::new(),
            })
            .await;
    }

    let workflow_engine = WorkflowEngine::new(coordinator.clone());
    let engine_events = tokio::spawn(workflow_engine.clone().run());

    let workflow = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "fan-out".to_string(),
            description: String::new(),
            steps: vec![
                step("s1", "a", &[]),
                step("s2", "b", &["s1"]),
                step("s3", "c", &["s1"]),
            ],
            config: WorkflowConfig {
                failure_policy: FailurePolicy::FailFast,
                max_step_retries: 0,
            },
        })
        .await
        .unwrap();

    workflow_engine.execute(&workflow.id).await.unwrap();

    wait_until(
        || dispatcher.dispatched.try_lock().map(|d| d.len() == 1).unwrap_or(false),
        Duration::from_millis(500),
    )
    .await;

    let s1_task = dispatcher.tasks_for("a").await.into_iter().next().unwrap();
    coordinator
        .complete_task(&s1_task.id, true, HashMap::new(), None)
        .await
        .unwrap();

    wait_until(
        || {
            dispatcher
                .dispatched
                .try_lock()
                .map(|d| d.len() == 3)
                .unwrap_or(false)
        },
        Duration::from_millis(500),
    )
    .await;

    let s2_task = dispatcher.tasks_for("b").await.into_iter().next().unwrap();
    let s3_task = dispatcher.tasks_for("c").await.into_iter().next().unwrap();
    coordinator
        .complete_task(&s2_task.id, true, HashMap::new(), None)
        .await
        .unwrap();
    coordinator
        .complete_task(&s3_task.id, true, HashMap::new(), None)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let workflow = coordinator.get_workflow(&workflow.id).await.unwrap();
        if workflow.status == crate::models::WorkflowStatus::Completed {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("workflow did not reach Completed within 2s (status: {:?})", workflow.status);
        }
        sleep(Duration::from_millis(10)).await;
    }

    engine_events.abort();
}

/// `continue_on_error`: a failed step cascades-cancels its dependents but
/// leaves independent branches free to finish; the workflow's own status
/// still ends up `Failed` (§4.3, and the Open Question decision recorded
/// in `DESIGN.md`).
#[tokio::test]
async fn continue_on_error_lets_independent_branch_finish() {
    let coordinator = Coordinator::new(CoordinatorConfig {
        admission_queue_size: 1000,
        task_timeout_default: Duration::from_secs(30),
        timeout_sweep_interval: Duration::from_secs(30),
    });
    let dispatcher = RecordingDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    for (name, capability) in [("a1", "a"), ("b1", "b"), ("c1", "c")] {
        coordinator
            .register_agent(AgentRegistration {
                name: name.to_string(),
                agent_type: "worker".to_string(),
                capabilities: HashSet::from([capability.to_string()]),
                config: HashMap::new(),
            })
            .await;
    }

    let workflow_engine = WorkflowEngine::new(coordinator.clone());
    let engine_events = tokio::spawn(workflow_engine.clone().run());

    let workflow = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "continue-on-error".to_string(),
            description: String::new(),
            steps: vec![
                step("s1", "a", &[]),
                step("s2", "b", &["s1"]),
                step("s3", "c", &[]),
            ],
            config: WorkflowConfig {
                failure_policy: FailurePolicy::ContinueOnError,
                max_step_retries: 0,
            },
        })
        .await
        .unwrap();

    workflow_engine.execute(&workflow.id).await.unwrap();

    // s1 and s3 have no dependencies and are both submitted in the initial
    // round.
    wait_until(
        || dispatcher.dispatched.try_lock().map(|d| d.len() == 2).unwrap_or(false),
        Duration::from_millis(500),
    )
    .await;

    let s1_task = dispatcher.tasks_for("a").await.into_iter().next().unwrap();
    let s3_task = dispatcher.tasks_for("c").await.into_iter().next().unwrap();

    coordinator
        .complete_task(&s1_task.id, false, HashMap::new(), Some("boom".to_string()))
        .await
        .unwrap();

    // s2 depends on the failed s1 and must never be dispatched.
    sleep(Duration::from_millis(100)).await;
    assert!(dispatcher.tasks_for("b").await.is_empty());

    coordinator
        .complete_task(&s3_task.id, true, HashMap::new(), None)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let workflow = coordinator.get_workflow(&workflow.id).await.unwrap();
        if workflow.status == crate::models::WorkflowStatus::Failed {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("workflow did not reach Failed within 2s (status: {:?})", workflow.status);
        }
        sleep(Duration::from_millis(10)).await;
    }

    assert!(dispatcher.tasks_for("b").await.is_empty());

    // s2 was never dispatched, but it must still surface through
    // list_tasks as a Cancelled task, not vanish from the workflow.
    let workflow_tasks = coordinator.list_tasks(None, None, Some(&workflow.id)).await;
    let s2_task = workflow_tasks
        .iter()
        .find(|t| t.step_index == Some(1))
        .expect("cascaded step s2 should have a queryable task");
    assert_eq!(s2_task.status, crate::models::TaskStatus::Cancelled);

    engine_events.abort();
}
