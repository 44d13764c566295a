//! Errors and their classification.
//!
//! - [`TaskError`]: why a single task did not complete. Captured in its
//!   `TaskResult`, never thrown across the manager boundary.
//! - [`ManagerError`]: failures of composite operations that do surface to the
//!   caller (pipeline stages, the reduce step, invalid arguments).

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::ids::TaskId;
use super::status::TaskStatus;

/// Terminal error of one task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The work function returned an error.
    #[error("{message}")]
    Work { message: String },

    /// One attempt exceeded its time window.
    #[error("attempt {attempt} timed out after {after:?}")]
    Timeout { attempt: u32, after: Duration },

    /// A prerequisite ended as failed or cancelled. The task never ran.
    #[error("upstream dependency {dependency} ended as {status}")]
    DependencyFailed {
        dependency: TaskId,
        status: TaskStatus,
    },

    /// A dependency id was never submitted to this manager.
    #[error("unknown dependency {dependency}")]
    UnknownDependency { dependency: TaskId },

    /// Waiting for dependencies exceeded the configured limit.
    #[error("dependencies not satisfied within {after:?}")]
    DependencyTimeout { after: Duration },

    /// The task was cancelled. Only produced when a cancelled result is
    /// converted into a `Result`; cancelled results carry no error payload.
    #[error("task was cancelled")]
    Cancelled,

    /// The task's retry policy allows no attempts. The task never ran.
    #[error("retry policy allows no attempts")]
    NoAttempts,

    /// The work function panicked.
    #[error("task body panicked: {message}")]
    Panicked { message: String },

    /// The result channel closed without a result (runtime shutting down).
    #[error("task was dropped before producing a result")]
    Abandoned,
}

impl TaskError {
    pub fn work(message: impl Into<String>) -> Self {
        TaskError::Work {
            message: message.into(),
        }
    }

    /// Did this task fail because of an upstream task rather than its own work?
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            TaskError::DependencyFailed { .. }
                | TaskError::UnknownDependency { .. }
                | TaskError::DependencyTimeout { .. }
        )
    }
}

/// Failure of a composite manager operation.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("pipeline stage {stage} ({task_id}) failed: {source}")]
    PipelineStage {
        stage: usize,
        task_id: TaskId,
        #[source]
        source: TaskError,
    },

    #[error("reduce task {task_id} failed: {source}")]
    Reduce {
        task_id: TaskId,
        #[source]
        source: TaskError,
    },

    #[error("race requires at least one task")]
    EmptyRace,

    #[error("scatter requires at least one worker")]
    NoWorkers,

    #[error("task {0} not found")]
    TaskNotFound(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn dependency_errors_are_classified() {
        let dependency = TaskId::from(Ulid::new());

        assert!(
            TaskError::DependencyFailed {
                dependency,
                status: TaskStatus::Failed
            }
            .is_dependency_failure()
        );
        assert!(TaskError::UnknownDependency { dependency }.is_dependency_failure());
        assert!(!TaskError::work("boom").is_dependency_failure());
        assert!(!TaskError::Cancelled.is_dependency_failure());
    }

    #[test]
    fn task_error_is_tagged() {
        let v = serde_json::to_value(TaskError::work("boom")).unwrap();
        assert_eq!(v["kind"], "work");
        assert_eq!(v["message"], "boom");
    }

    #[test]
    fn pipeline_error_mentions_stage() {
        let err = ManagerError::PipelineStage {
            stage: 1,
            task_id: TaskId::from(Ulid::new()),
            source: TaskError::work("bad input"),
        };
        let msg = err.to_string();
        assert!(msg.contains("stage 1"));
        assert!(msg.contains("bad input"));
    }
}
