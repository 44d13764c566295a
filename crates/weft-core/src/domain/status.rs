//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed (retries exhausted)
/// - Pending -> Running -> Cancelled
/// - Pending -> Failed (dependency failure, never ran)
/// - Pending -> Cancelled (cancelled before admission)
///
/// Completed, Failed and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting on dependencies or a free slot.
    Pending,

    /// Admitted and executing (including backoff between attempts).
    Running,

    Completed,

    Failed,

    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pending(TaskStatus::Pending, false)]
    #[case::running(TaskStatus::Running, false)]
    #[case::completed(TaskStatus::Completed, true)]
    #[case::failed(TaskStatus::Failed, true)]
    #[case::cancelled(TaskStatus::Cancelled, true)]
    fn terminal_states(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }
}
