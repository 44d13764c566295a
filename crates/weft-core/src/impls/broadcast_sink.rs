//! Event sink that fans events out to async subscribers.

use tokio::sync::broadcast;

use crate::domain::TaskEvent;
use crate::ports::EventSink;

/// Broadcasts events to any number of subscribers (dashboards, log
/// shippers). Slow subscribers lag and lose old events; the scheduler never
/// waits for them.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<TaskEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: &TaskEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let sink = BroadcastEventSink::default();
        let mut rx = sink.subscribe();
        let task_id = TaskId::from(Ulid::new());

        sink.emit(&TaskEvent::Started { task_id });

        assert_eq!(rx.recv().await.unwrap(), TaskEvent::Started { task_id });
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let sink = BroadcastEventSink::new(1);
        sink.emit(&TaskEvent::Cancelled {
            task_id: TaskId::from(Ulid::new()),
        });
    }
}
