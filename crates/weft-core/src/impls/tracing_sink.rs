//! Event sink that writes structured `tracing` records.

use tracing::{debug, info, warn};

use crate::domain::TaskEvent;
use crate::ports::EventSink;

/// Logs every lifecycle event. Failures log at `warn`, the rest at
/// `info`/`debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Submitted {
                task_id,
                name,
                priority,
            } => debug!(
                %task_id,
                task_name = name.as_deref().unwrap_or("-"),
                %priority,
                "task submitted"
            ),
            TaskEvent::Started { task_id } => debug!(%task_id, "task started"),
            TaskEvent::AttemptFailed {
                task_id,
                attempt,
                error,
                retry_in,
            } => warn!(%task_id, attempt, %error, ?retry_in, "attempt failed"),
            TaskEvent::Completed { task_id, attempts } => {
                info!(%task_id, attempts, "task completed")
            }
            TaskEvent::Failed { task_id, error } => warn!(%task_id, %error, "task failed"),
            TaskEvent::Cancelled { task_id } => info!(%task_id, "task cancelled"),
        }
    }
}
