use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};

/// Bounded set of task ids awaiting a capability match. Bounding this list
/// (rather than the `TaskStore` itself) is what makes `SubmitTask`'s
/// backpressure behavior precise: the store can hold any number of
/// terminal/assigned tasks, only *unmatched* ones count against the limit.
///
/// The matching pass never removes a task it couldn't place — a head task
/// with no capable agent available is left parked so a later task further
/// back in the list can still be matched in the same pass (skip-without-drop,
/// no head-of-line blocking).
pub struct PendingQueue {
    ids: Mutex<Vec<String>>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub async fn push(&self, task_id: String) -> Result<()> {
        let mut ids = self.ids.lock().await;
        if ids.len() >= self.capacity {
            return Err(OrchestratorError::QueueFull);
        }
        ids.push(task_id);
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.ids.lock().await.clone()
    }

    pub async fn remove(&self, task_id: &str) {
        let mut ids = self.ids.lock().await;
        ids.retain(|id| id != task_id);
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }
}
