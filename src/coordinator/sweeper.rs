use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::coordinator::events::Event;
use crate::coordinator::Coordinator;
use crate::models::TaskStatus;

/// Periodic sweep for tasks that have exceeded their configured timeout.
/// Runs on its own interval, independent of the dispatcher: timeouts are
/// enforced here, never by the dispatch loop itself.
pub async fn run(coordinator: Arc<Coordinator>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sweep_once(&coordinator).await;
    }
}

async fn sweep_once(coordinator: &Coordinator) {
    let now = Utc::now();
    let tasks = coordinator.tasks.list().await;
    for task in tasks {
        if task.status != TaskStatus::Running {
            continue;
        }
        let Some(started_at) = task.started_at else {
            continue;
        };
        let elapsed = now.signed_duration_since(started_at);
        let timeout = chrono::Duration::from_std(task.timeout).unwrap_or(chrono::Duration::zero());
        if elapsed < timeout {
            continue;
        }

        let task_id = task.id.clone();
        let result = coordinator
            .tasks
            .update(&task_id, |t| {
                if t.status != TaskStatus::Running {
                    return Ok(());
                }
                t.mark_terminal(TaskStatus::TimedOut, Default::default(), Some("task timed out".to_string()));
                Ok(())
            })
            .await;

        if result.is_err() {
            continue;
        }
        coordinator.counters.tasks_timed_out.fetch_add(1, Ordering::Relaxed);

        if let Some(agent_id) = task.agent_id.clone() {
            let _ = coordinator
                .agents
                .update(&agent_id, |a| a.set_status(crate::models::AgentStatus::Idle))
                .await;
            coordinator.notify_cancel(&agent_id, &task_id).await;
        }

        coordinator.events.publish(Event::TaskTimeout { task_id }).await;
        coordinator.wake_matcher();
    }
}
