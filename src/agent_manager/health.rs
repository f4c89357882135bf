use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::agent_manager::AgentManager;
use crate::models::AgentStatus;

/// Inbox-level check: an agent with no activity for `inactive_threshold`
/// is downgraded to `Offline` without tearing down its connection — the
/// Gateway owns the physical disconnect. This is the faster, lighter-weight
/// of the two timers.
pub async fn run_inactive_check(manager: Arc<AgentManager>, interval: Duration, inactive_threshold: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let agents = manager.coordinator.list_agents().await;
        let now = Utc::now();
        for agent in agents {
            if matches!(agent.status, AgentStatus::Offline | AgentStatus::Terminated) {
                continue;
            }
            let idle_for = now.signed_duration_since(agent.last_seen);
            if idle_for > chrono::Duration::from_std(inactive_threshold).unwrap_or_default() {
                tracing::warn!(agent_id = %agent.id, "agent inactive past threshold, marking offline");
                let _ = manager
                    .coordinator
                    .update_agent_status(&agent.id, AgentStatus::Offline)
                    .await;
            }
        }
    }
}

/// Global check: an agent with no activity for `dead_threshold` is
/// considered gone and unregistered, failing its in-flight tasks with
/// `agent_lost`.
pub async fn run_dead_check(manager: Arc<AgentManager>, interval: Duration, dead_threshold: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let agents = manager.coordinator.list_agents().await;
        let now = Utc::now();
        for agent in agents {
            let idle_for = now.signed_duration_since(agent.last_seen);
            if idle_for > chrono::Duration::from_std(dead_threshold).unwrap_or_default() {
                tracing::warn!(agent_id = %agent.id, "agent passed dead threshold, unregistering");
                manager.remove_connection(&agent.id).await;
                manager.coordinator.unregister_agent(&agent.id).await;
            }
        }
    }
}
