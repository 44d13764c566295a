//! Events - task lifecycle notifications.
//!
//! Delivered to [`EventSink`](crate::ports::EventSink)s. Observability only:
//! nothing in the scheduler depends on a sink receiving them.

use std::time::Duration;

use serde::Serialize;

use super::errors::TaskError;
use super::ids::TaskId;
use super::priority::Priority;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Submitted {
        task_id: TaskId,
        name: Option<String>,
        priority: Priority,
    },
    Started {
        task_id: TaskId,
    },
    AttemptFailed {
        task_id: TaskId,
        attempt: u32,
        error: TaskError,
        /// Backoff before the next attempt, if one follows.
        retry_in: Option<Duration>,
    },
    Completed {
        task_id: TaskId,
        attempts: u32,
    },
    Failed {
        task_id: TaskId,
        error: TaskError,
    },
    Cancelled {
        task_id: TaskId,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Submitted { task_id, .. }
            | TaskEvent::Started { task_id }
            | TaskEvent::AttemptFailed { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Cancelled { task_id } => *task_id,
        }
    }

    /// Does this event end the task's lifecycle?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Completed { .. } | TaskEvent::Failed { .. } | TaskEvent::Cancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn events_are_tagged() {
        let task_id = TaskId::from(Ulid::new());
        let v = serde_json::to_value(TaskEvent::Completed { task_id, attempts: 2 }).unwrap();

        assert_eq!(v["event"], "completed");
        assert_eq!(v["attempts"], 2);
        assert!(TaskEvent::Cancelled { task_id }.is_terminal());
        assert!(!TaskEvent::Started { task_id }.is_terminal());
    }
}
