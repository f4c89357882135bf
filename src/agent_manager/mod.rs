//! Agent Manager: tracks connected agents' per-agent inboxes, drives the
//! per-agent dispatch loop, and runs the two liveness timers.

pub mod health;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::config::AgentManagerConfig;
use crate::coordinator::{Coordinator, Dispatcher};
use crate::error::{OrchestratorError, Result};
use crate::gateway::protocol::OutboundMessage;
use crate::models::Task;

/// Per-agent dispatch state. The bounded inbox is the backpressure point
/// for that single agent: a full inbox means the Coordinator's matching
/// pass leaves the task Pending rather than blocking.
struct AgentConnection {
    inbox: mpsc::Sender<Task>,
    outbound: mpsc::Sender<OutboundMessage>,
    in_flight: AtomicUsize,
}

pub struct AgentManager {
    pub(crate) coordinator: Arc<Coordinator>,
    connections: RwLock<HashMap<String, Arc<AgentConnection>>>,
    config: AgentManagerConfig,
}

impl AgentManager {
    pub fn new(coordinator: Arc<Coordinator>, config: AgentManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            connections: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// Called by the Gateway once `agent.register` completes and the
    /// Coordinator has assigned an agent id. Spawns the per-agent dispatch
    /// loop that forwards inbox tasks out over `outbound`.
    pub async fn register_connection(
        self: &Arc<Self>,
        agent_id: String,
        outbound: mpsc::Sender<OutboundMessage>,
    ) {
        let (tx, rx) = mpsc::channel(self.config.agent_inbox_size);
        let connection = Arc::new(AgentConnection {
            inbox: tx,
            outbound,
            in_flight: AtomicUsize::new(0),
        });
        self.connections
            .write()
            .await
            .insert(agent_id.clone(), connection.clone());
        tokio::spawn(dispatch_loop(agent_id, connection, rx));
    }

    pub async fn remove_connection(&self, agent_id: &str) {
        self.connections.write().await.remove(agent_id);
    }

    /// Current queue depth of every connected agent's inbox, for the
    /// `/metrics` surface's per-agent backpressure visibility (spec.md §6).
    pub async fn inbox_depths(&self) -> HashMap<String, usize> {
        let capacity = self.config.agent_inbox_size;
        self.connections
            .read()
            .await
            .iter()
            .map(|(agent_id, conn)| (agent_id.clone(), capacity.saturating_sub(conn.inbox.capacity())))
            .collect()
    }

    pub async fn touch(&self, agent_id: &str) {
        let _ = self.coordinator.touch_agent(agent_id).await;
    }

    pub fn run_health_checks(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let inactive = tokio::spawn(health::run_inactive_check(
            self.clone(),
            std::time::Duration::from_secs(30),
            self.config.agent_inactive_threshold,
        ));
        let dead = tokio::spawn(health::run_dead_check(
            self.clone(),
            std::time::Duration::from_secs(60),
            self.config.agent_dead_threshold,
        ));
        vec![inactive, dead]
    }
}

async fn dispatch_loop(
    agent_id: String,
    connection: Arc<AgentConnection>,
    mut inbox: mpsc::Receiver<Task>,
) {
    while let Some(task) = inbox.recv().await {
        connection.in_flight.fetch_add(1, Ordering::Relaxed);
        let message = OutboundMessage::TaskDispatch {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
        };
        if connection.outbound.send(message).await.is_err() {
            tracing::warn!(agent_id, task_id = %task.id, "agent outbound channel closed mid-dispatch");
        }
    }
}

#[async_trait]
impl Dispatcher for AgentManager {
    async fn dispatch(&self, agent_id: &str, task: Task) -> Result<()> {
        let connections = self.connections.read().await;
        let connection = connections
            .get(agent_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("agent connection {agent_id}")))?;
        connection
            .inbox
            .try_send(task)
            .map_err(|_| OrchestratorError::QueueFull)
    }

    async fn notify_cancel(&self, agent_id: &str, task_id: &str) {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(agent_id) {
            let _ = connection
                .outbound
                .send(OutboundMessage::TaskCancel {
                    task_id: task_id.to_string(),
                })
                .await;
        }
    }
}
