use std::sync::atomic::AtomicU64;

/// Atomic counters incremented inline by the Coordinator, Agent Manager
/// and Workflow Engine at each state transition they own. Read by
/// [`crate::monitoring::OrchestratorMetrics`] to build `/metrics` snapshots.
#[derive(Default)]
pub struct Counters {
    pub tasks_submitted: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_timed_out: AtomicU64,
    pub agents_registered: AtomicU64,
    pub agents_unregistered: AtomicU64,
    pub workflows_started: AtomicU64,
    pub workflows_completed: AtomicU64,
    pub workflows_failed: AtomicU64,
}
