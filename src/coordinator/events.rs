use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::models::{AgentStatus, TaskStatus};

/// Internal events emitted on every state transition. Consumed by the
/// Workflow Engine and, best-effort, by external subscribers bridged
/// through the Gateway.
#[derive(Debug, Clone)]
pub enum Event {
    AgentRegistered { agent_id: String },
    AgentUnregistered { agent_id: String },
    AgentStatusChanged { agent_id: String, status: AgentStatus },
    TaskSubmitted { task_id: String },
    TaskAssigned { task_id: String, agent_id: String },
    TaskCompleted { task_id: String, status: TaskStatus },
    TaskTimeout { task_id: String },
    TaskCancelled { task_id: String },
}

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Fan-out event bus. Each subscriber gets its own bounded channel so a
/// slow subscriber never backs up another, and never blocks the emitting
/// state transition — a full subscriber channel just drops the event for
/// that subscriber.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<mpsc::Sender<Event>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.write().await.push(tx);
        rx
    }

    pub async fn publish(&self, event: Event) {
        let subscribers = self.subscribers.read().await;
        for sub in subscribers.iter() {
            if sub.try_send(event.clone()).is_err() {
                tracing::debug!("event subscriber lagging or gone, dropping event");
            }
        }
    }
}
