//! In-memory event sink (development and tests).

use std::sync::{Mutex, PoisonError};

use crate::domain::{TaskEvent, TaskId};
use crate::ports::EventSink;

/// Records every event in order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events of one task, in emission order.
    pub fn events_for(&self, task_id: TaskId) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id() == task_id)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
