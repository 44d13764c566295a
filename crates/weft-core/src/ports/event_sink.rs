//! EventSink port - ライフサイクルイベントの通知

use std::sync::Arc;

use crate::domain::TaskEvent;

/// EventSink receives task lifecycle events.
///
/// Fire-and-forget: `emit` must not block and must not call back into the
/// manager.
/// - 実装は [`crate::impls`] に置く
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TaskEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &TaskEvent) {}
}

/// Fan-out over the sinks registered with a manager.
#[derive(Clone)]
pub(crate) struct EventBus {
    sinks: Arc<[Arc<dyn EventSink>]>,
}

impl EventBus {
    pub(crate) fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks: sinks.into(),
        }
    }

    pub(crate) fn emit(&self, event: TaskEvent) {
        for sink in self.sinks.iter() {
            sink.emit(&event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks.len()
    }
}
