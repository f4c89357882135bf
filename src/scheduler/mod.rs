//! Scheduler: fires `Schedule` entries at their configured cron times and
//! synthesizes the corresponding Task or Workflow submission through the
//! Coordinator's normal admission path.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use tokio::sync::RwLock;

use crate::coordinator::Coordinator;
use crate::error::{OrchestratorError, Result};
use crate::models::{Schedule, ScheduleSubmission, ScheduleTargetType, TaskSubmission, WorkflowSubmission};
use crate::workflow_engine::WorkflowEngine;

pub struct Scheduler {
    coordinator: Arc<Coordinator>,
    workflow_engine: Arc<WorkflowEngine>,
    schedules: RwLock<HashMap<String, Schedule>>,
    heap: RwLock<BinaryHeap<Reverse<(DateTime<Utc>, String)>>>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<Coordinator>, workflow_engine: Arc<WorkflowEngine>) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            workflow_engine,
            schedules: RwLock::new(HashMap::new()),
            heap: RwLock::new(BinaryHeap::new()),
        })
    }

    pub async fn create_schedule(&self, submission: ScheduleSubmission) -> Result<Schedule> {
        let cron_schedule = CronSchedule::from_str(&submission.cron)
            .map_err(|e| OrchestratorError::Invalid(format!("invalid cron expression: {e}")))?;
        let mut schedule = Schedule::new(submission);
        if schedule.enabled {
            schedule.next_run = cron_schedule.upcoming(Utc).next();
        }

        if let Some(next_run) = schedule.next_run {
            self.heap
                .write()
                .await
                .push(Reverse((next_run, schedule.id.clone())));
        }
        self.schedules
            .write()
            .await
            .insert(schedule.id.clone(), schedule.clone());
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: &str) -> Result<Schedule> {
        self.schedules
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("schedule {id}")))
    }

    pub async fn list_schedules(&self) -> Vec<Schedule> {
        self.schedules.read().await.values().cloned().collect()
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<()> {
        self.schedules
            .write()
            .await
            .remove(id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("schedule {id}")))?;
        Ok(())
    }

    /// Drives the heap: sleeps until the earliest due schedule, fires it
    /// (if still enabled and still present — a deleted schedule's stale
    /// heap entry is simply dropped), and re-enqueues its next occurrence.
    pub async fn run(self: Arc<Self>) {
        loop {
            let next = { self.heap.write().await.pop() };
            let Some(Reverse((due_at, schedule_id))) = next else {
                tokio::time::sleep(crate::constants::SCHEDULER_TICK_INTERVAL).await;
                continue;
            };

            let now = Utc::now();
            if due_at > now {
                let wait = (due_at - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait.min(crate::constants::SCHEDULER_TICK_INTERVAL)).await;
                self.heap.write().await.push(Reverse((due_at, schedule_id)));
                continue;
            }

            self.fire(&schedule_id).await;
        }
    }

    async fn fire(&self, schedule_id: &str) {
        let Some(mut schedule) = self.schedules.read().await.get(schedule_id).cloned() else {
            return;
        };
        if !schedule.enabled {
            return;
        }

        match schedule.target_type {
            ScheduleTargetType::Task => {
                match serde_json::from_value::<TaskSubmission>(schedule.target_payload.clone()) {
                    Ok(submission) => {
                        if let Err(e) = self.coordinator.submit_task(submission).await {
                            tracing::warn!(schedule_id, "schedule fire failed to submit task: {e}");
                        }
                    }
                    Err(e) => tracing::warn!(schedule_id, "schedule task payload invalid: {e}"),
                }
            }
            ScheduleTargetType::Workflow => {
                match serde_json::from_value::<WorkflowSubmission>(schedule.target_payload.clone()) {
                    Ok(submission) => match self.coordinator.submit_workflow(submission).await {
                        Ok(workflow) => {
                            if let Err(e) = self.workflow_engine.execute(&workflow.id).await {
                                tracing::warn!(schedule_id, "schedule fire failed to execute workflow: {e}");
                            }
                        }
                        Err(e) => tracing::warn!(schedule_id, "schedule fire failed to submit workflow: {e}"),
                    },
                    Err(e) => tracing::warn!(schedule_id, "schedule workflow payload invalid: {e}"),
                }
            }
        }

        schedule.last_run = Some(Utc::now());
        if let Ok(cron_schedule) = CronSchedule::from_str(&schedule.cron) {
            schedule.next_run = cron_schedule.upcoming(Utc).next();
        }
        if let Some(next_run) = schedule.next_run {
            self.heap
                .write()
                .await
                .push(Reverse((next_run, schedule_id.to_string())));
        }
        schedule.updated_at = Utc::now();
        self.schedules
            .write()
            .await
            .insert(schedule_id.to_string(), schedule);
    }
}
