//! Task record: the manager's untyped bookkeeping for one task.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::TaskError;
use super::ids::TaskId;
use super::priority::Priority;
use super::result::TaskResult;
use super::status::TaskStatus;

/// Metadata of a task, independent of its value type.
///
/// Design:
/// - This is the single source of truth for task status.
/// - The queue and running set hold ids only.
/// - All status transitions happen through the methods here, and a terminal
///   record is never modified again.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub name: Option<String>,
    pub priority: Priority,
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,

    /// Number of attempts made so far.
    pub attempts: u32,

    /// Maximum allowed attempts (from the task's retry policy).
    pub max_attempts: u32,

    /// Terminal error, for failed tasks.
    pub last_error: Option<TaskError>,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        task_id: TaskId,
        name: Option<String>,
        priority: Priority,
        dependencies: Vec<TaskId>,
        max_attempts: u32,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            name,
            priority,
            dependencies,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            submitted_at,
            started_at: None,
            ended_at: None,
        }
    }

    /// Mark as admitted for execution.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
            self.started_at = Some(now);
        }
    }

    /// Copy the terminal outcome of a result into the record.
    ///
    /// Returns false (and changes nothing) if the record was already terminal.
    pub fn settle<T>(&mut self, result: &TaskResult<T>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = result.status;
        self.attempts = result.attempts;
        self.last_error = result.error.clone();
        self.started_at = result.started_at.or(self.started_at);
        self.ended_at = result.ended_at;
        true
    }

    /// Wall-clock execution time, for tasks that ran and finished.
    pub fn execution_time(&self) -> Option<std::time::Duration> {
        let started = self.started_at?;
        let ended = self.ended_at?;
        (ended - started).to_std().ok()
    }
}
