//! Handle to a submitted task.

use tokio::sync::watch;

use crate::domain::{TaskError, TaskId, TaskResult};

/// Typed handle returned by `submit`.
///
/// Cloneable; every clone observes the same result. Dropping a handle does
/// not cancel the task.
#[derive(Debug, Clone)]
pub struct TaskHandle<T> {
    task_id: TaskId,
    rx: watch::Receiver<Option<TaskResult<T>>>,
}

impl<T: Clone> TaskHandle<T> {
    pub(crate) fn new(task_id: TaskId, rx: watch::Receiver<Option<TaskResult<T>>>) -> Self {
        Self { task_id, rx }
    }

    pub fn id(&self) -> TaskId {
        self.task_id
    }

    /// The result, if the task already finished.
    pub fn try_result(&self) -> Option<TaskResult<T>> {
        self.rx.borrow().clone()
    }

    /// Wait for the terminal result.
    ///
    /// Never fails: failures and cancellations are reported in the result.
    /// If the manager is dropped mid-flight the result is a failure with
    /// [`TaskError::Abandoned`].
    pub async fn wait(&self) -> TaskResult<T> {
        let mut rx = self.rx.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(result) => result.clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(|| {
            TaskResult::failed(
                self.task_id,
                TaskError::Abandoned,
                0,
                None,
                chrono::Utc::now(),
            )
        })
    }
}
