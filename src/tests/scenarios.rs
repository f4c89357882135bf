//! End-to-end scenarios driven entirely through the Coordinator's public
//! API, with a fake [`Dispatcher`] standing in for the Agent Manager so
//! each scenario controls exactly when (and whether) a dispatched task
//! "completes".

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::CoordinatorConfig;
use crate::coordinator::{sweeper, Coordinator, Dispatcher};
use crate::error::{OrchestratorError, Result};
use crate::models::{
    AgentRegistration, AgentStatus, FailurePolicy, Task, TaskStatus, TaskSubmission,
    WorkflowConfig, WorkflowStep, WorkflowSubmission,
};

/// Records every dispatched task; an agent name can be put into "silent"
/// mode to model a worker that receives a task but never replies.
#[derive(Default)]
struct FakeDispatcher {
    dispatched: Mutex<Vec<(String, Task)>>,
    silent: Mutex<HashSet<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl FakeDispatcher {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn go_silent(&self, agent_id: &str) {
        self.silent.lock().await.insert(agent_id.to_string());
    }

    async fn dispatched_to(&self, agent_id: &str, task_id: &str) -> bool {
        self.dispatched
            .lock()
            .await
            .iter()
            .any(|(id, t)| id == agent_id && t.id == task_id)
    }

    async fn was_cancelled(&self, task_id: &str) -> bool {
        self.cancelled.lock().await.iter().any(|t| t == task_id)
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(&self, agent_id: &str, task: Task) -> Result<()> {
        self.dispatched.lock().await.push((agent_id.to_string(), task));
        Ok(())
    }

    async fn notify_cancel(&self, _agent_id: &str, task_id: &str) {
        self.cancelled.lock().await.push(task_id.to_string());
    }
}

fn test_config(admission_queue_size: usize) -> CoordinatorConfig {
    CoordinatorConfig {
        admission_queue_size,
        task_timeout_default: Duration::from_secs(30),
        timeout_sweep_interval: Duration::from_millis(50),
    }
}

fn registration(name: &str, capabilities: &[&str]) -> AgentRegistration {
    AgentRegistration {
        name: name.to_string(),
        agent_type: "worker".to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        config: HashMap::new(),
    }
}

fn task_submission(task_type: &str, timeout_secs: Option<u64>) -> TaskSubmission {
    TaskSubmission {
        task_type: task_type.to_string(),
        priority: 0,
        payload: HashMap::new(),
        agent_id: None,
        workflow_id: None,
        step_index: None,
        timeout_secs,
    }
}

/// Polls `check` every 10ms until it resolves true or `timeout` elapses.
async fn wait_until<F, Fut>(mut check: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn s1_single_happy_path() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    let agent = coordinator.register_agent(registration("a1", &["code"])).await;

    let task = coordinator
        .submit_task(task_submission("code", Some(10)))
        .await
        .unwrap();

    wait_until(
        || async { dispatcher.dispatched_to(&agent.id, &task.id).await },
        Duration::from_millis(500),
    )
    .await;

    let running = coordinator.get_task(&task.id).await.unwrap();
    assert_eq!(running.status, TaskStatus::Running);
    let busy_agent = coordinator.get_agent(&agent.id).await.unwrap();
    assert_eq!(busy_agent.status, AgentStatus::Busy);

    let mut result = HashMap::new();
    result.insert("out".to_string(), "hello".to_string());
    let completed = coordinator
        .complete_task(&task.id, true, result, None)
        .await
        .unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.result.get("out"), Some(&"hello".to_string()));
    let idle_agent = coordinator.get_agent(&agent.id).await.unwrap();
    assert_eq!(idle_agent.status, AgentStatus::Idle);
}

#[tokio::test]
async fn s2_capability_miss_then_match() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    coordinator.register_agent(registration("a1", &["code"])).await;

    let task = coordinator
        .submit_task(task_submission("data", None))
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;
    let still_pending = coordinator.get_task(&task.id).await.unwrap();
    assert_eq!(still_pending.status, TaskStatus::Pending);

    let a2 = coordinator.register_agent(registration("a2", &["data"])).await;

    wait_until(
        || async { dispatcher.dispatched_to(&a2.id, &task.id).await },
        Duration::from_millis(500),
    )
    .await;

    let running = coordinator.get_task(&task.id).await.unwrap();
    assert_eq!(running.status, TaskStatus::Running);
    assert_eq!(running.agent_id, Some(a2.id));
}

#[tokio::test]
async fn s3_timeout_returns_agent_to_idle_and_cancels() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());
    let _sweeper = tokio::spawn(sweeper::run(coordinator.clone(), Duration::from_millis(50)));

    let agent = coordinator.register_agent(registration("a1", &["x"])).await;
    dispatcher.go_silent(&agent.id).await;

    let task = coordinator
        .submit_task(task_submission("x", Some(1)))
        .await
        .unwrap();

    wait_until(
        || async { dispatcher.dispatched_to(&agent.id, &task.id).await },
        Duration::from_millis(500),
    )
    .await;

    wait_until(
        || async {
            coordinator
                .get_task(&task.id)
                .await
                .map(|t| t.status == TaskStatus::TimedOut)
                .unwrap_or(false)
        },
        Duration::from_secs(3),
    )
    .await;

    let timed_out = coordinator.get_task(&task.id).await.unwrap();
    assert!(timed_out.error.is_some());
    let idle_agent = coordinator.get_agent(&agent.id).await.unwrap();
    assert_eq!(idle_agent.status, AgentStatus::Idle);
    assert!(dispatcher.was_cancelled(&task.id).await);
}

#[tokio::test]
async fn s6_backpressure_rejects_beyond_capacity() {
    let coordinator = Coordinator::new(test_config(2));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;

    let first = coordinator.submit_task(task_submission("code", None)).await;
    let second = coordinator.submit_task(task_submission("code", None)).await;
    let third = coordinator.submit_task(task_submission("code", None)).await;

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(matches!(third, Err(OrchestratorError::QueueFull)));

    assert_eq!(
        coordinator.get_task(&first.unwrap().id).await.unwrap().status,
        TaskStatus::Pending
    );
    assert_eq!(
        coordinator.get_task(&second.unwrap().id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn s5_worker_disconnect_fails_running_task() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    let agent = coordinator.register_agent(registration("a1", &["code"])).await;
    let task = coordinator
        .submit_task(task_submission("code", None))
        .await
        .unwrap();

    wait_until(
        || async { dispatcher.dispatched_to(&agent.id, &task.id).await },
        Duration::from_millis(500),
    )
    .await;
    assert_eq!(
        coordinator.get_task(&task.id).await.unwrap().status,
        TaskStatus::Running
    );

    // Gateway connection drop: unregister the agent the way
    // `Gateway::handle_disconnect` does.
    coordinator.unregister_agent(&agent.id).await;

    let failed = coordinator.get_task(&task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("agent_lost"));
    assert!(coordinator.get_agent(&agent.id).await.is_err());
}

/// Property 5: a cyclic dependency graph is rejected outright, leaving no
/// partial state (the workflow is never stored).
#[tokio::test]
async fn cyclic_workflow_is_rejected() {
    let coordinator = Coordinator::new(test_config(1000));

    let submission = WorkflowSubmission {
        name: "cyclic".to_string(),
        description: String::new(),
        steps: vec![
            WorkflowStep {
                name: "s1".to_string(),
                task_type: "a".to_string(),
                payload: HashMap::new(),
                agent_id: None,
                timeout_secs: None,
                depends_on: HashSet::from(["s2".to_string()]),
                task_id: None,
            },
            WorkflowStep {
                name: "s2".to_string(),
                task_type: "b".to_string(),
                payload: HashMap::new(),
                agent_id: None,
                timeout_secs: None,
                depends_on: HashSet::from(["s1".to_string()]),
                task_id: None,
            },
        ],
        config: WorkflowConfig {
            failure_policy: FailurePolicy::FailFast,
            max_step_retries: 0,
        },
    };

    let result = coordinator.submit_workflow(submission).await;
    assert!(matches!(result, Err(OrchestratorError::Invalid(_))));
    assert!(coordinator.list_workflows().await.is_empty());
}

/// Open question (§9): first completion wins; a duplicate `CompleteTask`
/// for an already-terminal task is ignored rather than erroring or
/// double-transitioning.
#[tokio::test]
async fn duplicate_completion_is_ignored() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    let agent = coordinator.register_agent(registration("a1", &["code"])).await;
    let task = coordinator
        .submit_task(task_submission("code", None))
        .await
        .unwrap();
    wait_until(
        || async { dispatcher.dispatched_to(&agent.id, &task.id).await },
        Duration::from_millis(500),
    )
    .await;

    let mut first_result = HashMap::new();
    first_result.insert("out".to_string(), "first".to_string());
    let first = coordinator
        .complete_task(&task.id, true, first_result, None)
        .await
        .unwrap();
    assert_eq!(first.status, TaskStatus::Completed);

    let mut second_result = HashMap::new();
    second_result.insert("out".to_string(), "second".to_string());
    let second = coordinator
        .complete_task(&task.id, false, second_result, Some("late".to_string()))
        .await
        .unwrap();

    // Still the first completion's outcome: no double-transition, no
    // overwrite of the already-terminal result.
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.result.get("out"), Some(&"first".to_string()));
}

/// Property 7: cancelling an already-terminal task is rejected, never a
/// second state transition.
#[tokio::test]
async fn cancel_is_idempotent_on_terminal_task() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;

    let task = coordinator
        .submit_task(task_submission("code", None))
        .await
        .unwrap();
    let cancelled = coordinator.cancel_task(&task.id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let second_cancel = coordinator.cancel_task(&task.id).await;
    assert!(matches!(second_cancel, Err(OrchestratorError::InvalidState(_))));
}

/// Property 6: a head-of-queue task with no capable agent doesn't block a
/// later task that does have one.
#[tokio::test]
async fn queue_fairness_skips_unmatched_head() {
    let coordinator = Coordinator::new(test_config(1000));
    let dispatcher = FakeDispatcher::new();
    coordinator.set_dispatcher(dispatcher.clone()).await;
    let _matcher = tokio::spawn(coordinator.clone().run_matcher());

    // No agent yet capable of "rare"; a1 only handles "common".
    let unmatched = coordinator
        .submit_task(task_submission("rare", None))
        .await
        .unwrap();
    let agent = coordinator.register_agent(registration("a1", &["common"])).await;
    let matched = coordinator
        .submit_task(task_submission("common", None))
        .await
        .unwrap();

    wait_until(
        || async { dispatcher.dispatched_to(&agent.id, &matched.id).await },
        Duration::from_millis(500),
    )
    .await;

    assert_eq!(
        coordinator.get_task(&matched.id).await.unwrap().status,
        TaskStatus::Running
    );
    assert_eq!(
        coordinator.get_task(&unmatched.id).await.unwrap().status,
        TaskStatus::Pending
    );
}
