//! Aggregate metrics and health sampling for the orchestration engine.
//! Counters are incremented inline at each state transition; a background
//! sampler periodically snapshots them into a bounded history for trend
//! queries from `/metrics`.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::agent_manager::AgentManager;
use crate::constants::METRICS_HISTORY_RETENTION;
use crate::coordinator::metrics::Counters;
use crate::coordinator::Coordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Point-in-time snapshot, serialized as-is for `/metrics` and appended to
/// the retained history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub health_status: HealthStatus,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_timed_out: u64,
    pub agents_registered: u64,
    pub agents_unregistered: u64,
    pub workflows_started: u64,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub connected_agents: usize,
    pub agent_inbox_depth: HashMap<String, usize>,
}

pub struct OrchestratorMetrics {
    start_time: Instant,
    counters: Arc<Counters>,
    history: Arc<RwLock<Vec<MetricsSnapshot>>>,
    coordinator: Arc<Coordinator>,
    agent_manager: Arc<AgentManager>,
}

impl OrchestratorMetrics {
    pub fn new(coordinator: Arc<Coordinator>, agent_manager: Arc<AgentManager>) -> Arc<Self> {
        let counters = coordinator.counters();
        Arc::new(Self {
            start_time: Instant::now(),
            counters,
            history: Arc::new(RwLock::new(Vec::new())),
            coordinator,
            agent_manager,
        })
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let tasks = self.coordinator.list_tasks(None, None, None).await;
        let pending = tasks
            .iter()
            .filter(|t| t.status == crate::models::TaskStatus::Pending)
            .count();
        let running = tasks
            .iter()
            .filter(|t| t.status == crate::models::TaskStatus::Running)
            .count();
        let connected_agents = self.coordinator.list_agents().await.len();

        let tasks_failed = self.counters.tasks_failed.load(Ordering::Relaxed);
        let connected_ratio_unhealthy = connected_agents == 0 && pending > 0;

        let health_status = if connected_ratio_unhealthy {
            HealthStatus::Unhealthy
        } else if tasks_failed > 0 && pending > running.max(1) * 4 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        MetricsSnapshot {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            health_status,
            tasks_submitted: self.counters.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.counters.tasks_completed.load(Ordering::Relaxed),
            tasks_failed,
            tasks_timed_out: self.counters.tasks_timed_out.load(Ordering::Relaxed),
            agents_registered: self.counters.agents_registered.load(Ordering::Relaxed),
            agents_unregistered: self.counters.agents_unregistered.load(Ordering::Relaxed),
            workflows_started: self.counters.workflows_started.load(Ordering::Relaxed),
            workflows_completed: self.counters.workflows_completed.load(Ordering::Relaxed),
            workflows_failed: self.counters.workflows_failed.load(Ordering::Relaxed),
            pending_tasks: pending,
            running_tasks: running,
            connected_agents,
            agent_inbox_depth: self.agent_manager.inbox_depths().await,
        }
    }

    pub async fn history(&self) -> Vec<MetricsSnapshot> {
        self.history.read().await.clone()
    }

    /// Samples every `interval` and appends to the bounded history,
    /// dropping the oldest entry once `METRICS_HISTORY_RETENTION` is hit.
    pub async fn run_sampler(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let snapshot = self.snapshot().await;
            let mut history = self.history.write().await;
            history.push(snapshot);
            if history.len() > METRICS_HISTORY_RETENTION {
                let overflow = history.len() - METRICS_HISTORY_RETENTION;
                history.drain(0..overflow);
            }
        }
    }
}
