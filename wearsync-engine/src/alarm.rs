//! Reminder/alarm collaborator interface.
//!
//! The platform alarm scheduler is external to the engine; the engine
//! only tells it what to arm and what to drop. Calls may repeat (inbound
//! ops are at-least-once), so implementations must be idempotent.

use async_trait::async_trait;
use std::sync::Mutex;
use wearsync_types::{Task, TaskId};

/// Local reminder scheduler.
#[async_trait]
pub trait AlarmScheduler: Send + Sync {
    /// Arm (or re-arm) the reminder for a task.
    async fn schedule(&self, task: &Task);

    /// Drop any reminder for the task.
    async fn cancel(&self, task_id: &TaskId);
}

/// No-op scheduler for headless use.
#[derive(Debug, Default)]
pub struct NullAlarms;

#[async_trait]
impl AlarmScheduler for NullAlarms {
    async fn schedule(&self, _task: &Task) {}
    async fn cancel(&self, _task_id: &TaskId) {}
}

/// Recording scheduler for tests.
#[derive(Debug, Default)]
pub struct RecordingAlarms {
    scheduled: Mutex<Vec<TaskId>>,
    cancelled: Mutex<Vec<TaskId>>,
}

impl RecordingAlarms {
    /// Create a new recording scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Task ids passed to `schedule`, in order.
    pub fn scheduled(&self) -> Vec<TaskId> {
        self.scheduled.lock().unwrap().clone()
    }

    /// Task ids passed to `cancel`, in order.
    pub fn cancelled(&self) -> Vec<TaskId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlarmScheduler for RecordingAlarms {
    async fn schedule(&self, task: &Task) {
        self.scheduled.lock().unwrap().push(task.id.clone());
    }

    async fn cancel(&self, task_id: &TaskId) {
        self.cancelled.lock().unwrap().push(task_id.clone());
    }
}
