use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{TaskRecord, TaskStatus};

/// Snapshot of the manager's counters, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcurrencyMetrics {
    /// Every task ever submitted.
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    /// Mean wall-clock time of completed tasks.
    pub average_execution_time: Duration,
    /// Completions inside the trailing throughput window.
    pub throughput: usize,
    /// Running tasks over the concurrency limit (0.0 - 1.0).
    pub utilization: f64,
}

impl ConcurrencyMetrics {
    pub(crate) fn compute<'a>(
        records: impl IntoIterator<Item = &'a TaskRecord>,
        running: usize,
        capacity: usize,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        let window_start = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w));

        let mut metrics = Self {
            total_tasks: 0,
            pending_tasks: 0,
            running_tasks: running,
            completed_tasks: 0,
            failed_tasks: 0,
            cancelled_tasks: 0,
            average_execution_time: Duration::ZERO,
            throughput: 0,
            utilization: 0.0,
        };
        let mut total_execution = Duration::ZERO;
        let mut timed = 0u32;

        for record in records {
            metrics.total_tasks += 1;
            match record.status {
                TaskStatus::Pending => metrics.pending_tasks += 1,
                TaskStatus::Running => {}
                TaskStatus::Completed => {
                    metrics.completed_tasks += 1;
                    if let Some(elapsed) = record.execution_time() {
                        total_execution += elapsed;
                        timed += 1;
                    }
                    let in_window = match (record.ended_at, window_start) {
                        (Some(ended), Some(start)) => ended >= start,
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if in_window {
                        metrics.throughput += 1;
                    }
                }
                TaskStatus::Failed => metrics.failed_tasks += 1,
                TaskStatus::Cancelled => metrics.cancelled_tasks += 1,
            }
        }

        if timed > 0 {
            metrics.average_execution_time = total_execution / timed;
        }
        if capacity > 0 {
            metrics.utilization = running as f64 / capacity as f64;
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskId, TaskResult};
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(status: TaskStatus, started: i64, ended: i64) -> TaskRecord {
        let id = TaskId::from(Ulid::new());
        let mut record = TaskRecord::new(id, None, Priority::Normal, vec![], 3, at(0));
        match status {
            TaskStatus::Pending => {}
            TaskStatus::Running => record.mark_running(at(started)),
            TaskStatus::Completed => {
                record.settle(&TaskResult::completed(id, (), 1, at(started), at(ended)));
            }
            TaskStatus::Failed => {
                record.settle(&TaskResult::<()>::failed(
                    id,
                    crate::domain::TaskError::work("x"),
                    1,
                    Some(at(started)),
                    at(ended),
                ));
            }
            TaskStatus::Cancelled => {
                record.settle(&TaskResult::<()>::cancelled(id, 0, None, at(ended)));
            }
        }
        record
    }

    #[test]
    fn empty_manager_has_zero_metrics() {
        let metrics =
            ConcurrencyMetrics::compute(std::iter::empty(), 0, 4, at(0), Duration::from_secs(60));
        assert_eq!(metrics.total_tasks, 0);
        assert_eq!(metrics.average_execution_time, Duration::ZERO);
        assert_eq!(metrics.utilization, 0.0);
    }

    #[test]
    fn counts_by_status() {
        let records = vec![
            record(TaskStatus::Pending, 0, 0),
            record(TaskStatus::Running, 1, 0),
            record(TaskStatus::Completed, 1, 3),
            record(TaskStatus::Completed, 1, 5),
            record(TaskStatus::Failed, 1, 2),
            record(TaskStatus::Cancelled, 0, 2),
        ];

        let metrics = ConcurrencyMetrics::compute(&records, 1, 4, at(10), Duration::from_secs(60));

        assert_eq!(metrics.total_tasks, 6);
        assert_eq!(metrics.pending_tasks, 1);
        assert_eq!(metrics.running_tasks, 1);
        assert_eq!(metrics.completed_tasks, 2);
        assert_eq!(metrics.failed_tasks, 1);
        assert_eq!(metrics.cancelled_tasks, 1);
        // (2s + 4s) / 2
        assert_eq!(metrics.average_execution_time, Duration::from_secs(3));
        assert_eq!(metrics.utilization, 0.25);
    }

    #[rstest]
    #[case::all_inside(100, 2)]
    #[case::one_inside(6, 1)]
    #[case::none_inside(1, 0)]
    fn throughput_counts_completions_in_window(#[case] window_secs: u64, #[case] expected: usize) {
        let records = vec![
            record(TaskStatus::Completed, 0, 2),
            record(TaskStatus::Completed, 0, 6),
        ];

        let metrics =
            ConcurrencyMetrics::compute(&records, 0, 2, at(10), Duration::from_secs(window_secs));

        assert_eq!(metrics.throughput, expected);
    }
}
