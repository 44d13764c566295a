//! Typed result of one task.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::TaskError;
use super::ids::TaskId;
use super::status::TaskStatus;

/// Terminal outcome of a task, as delivered to the caller.
///
/// - `value` is present iff `status == Completed`
/// - `error` is present iff `status == Failed`
/// - `started_at` is absent for tasks that never ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult<T> {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub value: Option<T>,
    pub error: Option<TaskError>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

impl<T> TaskResult<T> {
    pub fn completed(
        task_id: TaskId,
        value: T,
        attempts: u32,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            value: Some(value),
            error: None,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            attempts,
        }
    }

    pub fn failed(
        task_id: TaskId,
        error: TaskError,
        attempts: u32,
        started_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            value: None,
            error: Some(error),
            started_at,
            ended_at: Some(ended_at),
            attempts,
        }
    }

    pub fn cancelled(
        task_id: TaskId,
        attempts: u32,
        started_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Cancelled,
            value: None,
            error: None,
            started_at,
            ended_at: Some(ended_at),
            attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Wall-clock execution time, if the task ran.
    pub fn execution_time(&self) -> Option<std::time::Duration> {
        let started = self.started_at?;
        let ended = self.ended_at?;
        (ended - started).to_std().ok()
    }

    /// Collapse into a plain `Result`. Cancelled results map to
    /// [`TaskError::Cancelled`].
    pub fn into_result(self) -> Result<T, TaskError> {
        match (self.status, self.value, self.error) {
            (TaskStatus::Completed, Some(value), _) => Ok(value),
            (TaskStatus::Cancelled, _, _) => Err(TaskError::Cancelled),
            (_, _, Some(error)) => Err(error),
            _ => Err(TaskError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn id() -> TaskId {
        TaskId::from(Ulid::new())
    }

    #[test]
    fn completed_result_carries_value_only() {
        let now = Utc::now();
        let r = TaskResult::completed(id(), 5, 1, now, now + chrono::Duration::milliseconds(20));

        assert!(r.is_completed());
        assert!(r.error.is_none());
        assert_eq!(r.execution_time(), Some(std::time::Duration::from_millis(20)));
        assert_eq!(r.into_result(), Ok(5));
    }

    #[test]
    fn failed_result_carries_error_only() {
        let r: TaskResult<u8> =
            TaskResult::failed(id(), TaskError::work("boom"), 3, None, Utc::now());

        assert!(r.value.is_none());
        assert_eq!(r.execution_time(), None);
        assert_eq!(r.into_result(), Err(TaskError::work("boom")));
    }

    #[test]
    fn cancelled_result_has_no_error_payload() {
        let r: TaskResult<u8> = TaskResult::cancelled(id(), 0, None, Utc::now());

        assert_eq!(r.status, TaskStatus::Cancelled);
        assert!(r.error.is_none());
        assert_eq!(r.into_result(), Err(TaskError::Cancelled));
    }
}
