//! TaskRunner - executes one admitted task.
//!
//! Owns the attempt loop: progress notification, timeout, backoff between
//! attempts, cancellation and panic capture. The slot permit is held for the
//! whole loop (backoff included) and released before the result is reported.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::domain::{
    CancelCallback, ProgressCallback, TaskError, TaskEvent, TaskId, TaskProgress, TaskResult, Work,
};
use crate::ports::{Clock, EventBus};
use crate::queue::{RetryPolicy, SlotPermit, TimeoutPolicy};

enum Outcome<T> {
    Completed(T),
    Failed(TaskError),
    Cancelled,
}

pub(crate) struct TaskRunner<T> {
    pub(crate) task_id: TaskId,
    pub(crate) work: Arc<dyn Work<T>>,
    pub(crate) retry: RetryPolicy,
    pub(crate) timeout: Duration,
    pub(crate) timeout_policy: TimeoutPolicy,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) on_cancel: Option<CancelCallback>,
    pub(crate) cancel_rx: watch::Receiver<bool>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: EventBus,
}

impl<T: Send + 'static> TaskRunner<T> {
    /// Run attempts until one succeeds, the retry policy gives up, the
    /// timeout budget is spent, or the task is cancelled.
    pub(crate) async fn run(mut self, permit: SlotPermit) -> TaskResult<T> {
        let task_id = self.task_id;
        let started_at = self.clock.now();
        let deadline = Instant::now() + self.timeout;
        self.events.emit(TaskEvent::Started { task_id });

        let mut attempts = 0u32;
        let outcome = loop {
            if *self.cancel_rx.borrow() {
                break Outcome::Cancelled;
            }
            if !self.retry.allows_another(attempts) {
                break Outcome::Failed(TaskError::NoAttempts);
            }
            attempts += 1;
            debug!(%task_id, attempt = attempts, "attempt started");
            if let Some(on_progress) = &self.on_progress {
                let progress = TaskProgress {
                    task_id,
                    attempt: attempts,
                    max_attempts: self.retry.max_attempts,
                };
                guard_callback(task_id, "on_progress", || on_progress(progress));
            }

            let window = match self.timeout_policy {
                TimeoutPolicy::PerAttempt => self.timeout,
                TimeoutPolicy::Total => deadline.saturating_duration_since(Instant::now()),
            };
            let guarded = AssertUnwindSafe(self.work.run()).catch_unwind();
            let attempt = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => break Outcome::Cancelled,
                attempt = time::timeout(window, guarded) => attempt,
            };
            let error = match attempt {
                Ok(Ok(Ok(value))) => break Outcome::Completed(value),
                Ok(Ok(Err(error))) => error,
                Ok(Err(payload)) => TaskError::Panicked {
                    message: panic_message(&*payload),
                },
                Err(_) => TaskError::Timeout {
                    attempt: attempts,
                    after: window,
                },
            };

            let budget_left = match self.timeout_policy {
                TimeoutPolicy::PerAttempt => true,
                TimeoutPolicy::Total => Instant::now() < deadline,
            };
            if !budget_left || !self.retry.allows_another(attempts) {
                self.events.emit(TaskEvent::AttemptFailed {
                    task_id,
                    attempt: attempts,
                    error: error.clone(),
                    retry_in: None,
                });
                break Outcome::Failed(error);
            }

            let delay = self.retry.next_delay(attempts);
            self.events.emit(TaskEvent::AttemptFailed {
                task_id,
                attempt: attempts,
                error,
                retry_in: Some(delay),
            });
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => break Outcome::Cancelled,
                _ = time::sleep(delay) => {}
            }
        };

        permit.release();
        let ended_at = self.clock.now();
        match outcome {
            Outcome::Completed(value) => {
                TaskResult::completed(task_id, value, attempts, started_at, ended_at)
            }
            Outcome::Failed(error) => {
                TaskResult::failed(task_id, error, attempts, Some(started_at), ended_at)
            }
            Outcome::Cancelled => {
                self.notify_cancelled();
                TaskResult::cancelled(task_id, attempts, Some(started_at), ended_at)
            }
        }
    }

    /// Result for a task cancelled before it was admitted.
    pub(crate) fn cancel_unstarted(self) -> TaskResult<T> {
        self.notify_cancelled();
        TaskResult::cancelled(self.task_id, 0, None, self.clock.now())
    }

    /// Result for a task that can never run (failed or unknown dependency).
    pub(crate) fn reject(self, error: TaskError) -> TaskResult<T> {
        TaskResult::failed(self.task_id, error, 0, None, self.clock.now())
    }

    fn notify_cancelled(&self) {
        if let Some(on_cancel) = &self.on_cancel {
            guard_callback(self.task_id, "on_cancel", || on_cancel(self.task_id));
        }
    }
}

/// Run a user callback. A panic is logged and does not affect the task.
/// （コールバックの失敗でタスクを止めない）
fn guard_callback(task_id: TaskId, callback: &str, f: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = panic_message(&*payload);
        warn!(%task_id, callback, %message, "task callback panicked");
    }
}

/// Resolves once cancellation is requested. Never resolves if the signal's
/// sender is gone.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::impls::MemoryEventSink;
    use crate::ports::SystemClock;
    use crate::queue::Semaphore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use ulid::Ulid;

    struct Harness {
        semaphore: Semaphore,
        cancel_tx: watch::Sender<bool>,
        sink: Arc<MemoryEventSink>,
    }

    fn runner<T: Send + 'static>(
        work: impl Work<T> + 'static,
        retry: RetryPolicy,
        timeout: Duration,
        timeout_policy: TimeoutPolicy,
    ) -> (TaskRunner<T>, Harness) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let sink = Arc::new(MemoryEventSink::new());
        let runner = TaskRunner {
            task_id: TaskId::from(Ulid::new()),
            work: Arc::new(work),
            retry,
            timeout,
            timeout_policy,
            on_progress: None,
            on_cancel: None,
            cancel_rx,
            clock: Arc::new(SystemClock),
            events: EventBus::new(vec![sink.clone()]),
        };
        let harness = Harness {
            semaphore: Semaphore::new(1),
            cancel_tx,
            sink,
        };
        (runner, harness)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = {
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TaskError::work("flaky"))
                    } else {
                        Ok(n)
                    }
                }
            }
        };
        let (runner, harness) = runner(
            work,
            RetryPolicy::new(3, Duration::from_millis(10)),
            Duration::from_secs(1),
            TimeoutPolicy::PerAttempt,
        );

        let permit = harness.semaphore.try_acquire().unwrap();
        let result = runner.run(permit).await;

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.value, Some(3));
        assert_eq!(result.attempts, 3);
        assert_eq!(harness.semaphore.available(), 1);
        let retries = harness
            .sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, TaskEvent::AttemptFailed { retry_in: Some(_), .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panics_are_captured() {
        let (runner, harness) = runner(
            || async {
                if true {
                    panic!("boom");
                }
                Ok::<(), TaskError>(())
            },
            RetryPolicy::no_retry(),
            Duration::from_secs(1),
            TimeoutPolicy::PerAttempt,
        );

        let permit = harness.semaphore.try_acquire().unwrap();
        let result = runner.run(permit).await;

        assert_eq!(
            result.error,
            Some(TaskError::Panicked {
                message: "boom".to_string()
            })
        );
        assert_eq!(harness.semaphore.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_attempt() {
        let (runner, harness) = runner(
            || async {
                time::sleep(Duration::from_secs(60)).await;
                Ok::<(), TaskError>(())
            },
            RetryPolicy::no_retry(),
            Duration::from_secs(120),
            TimeoutPolicy::PerAttempt,
        );

        let permit = harness.semaphore.try_acquire().unwrap();
        let handle = tokio::spawn(runner.run(permit));
        time::sleep(Duration::from_secs(1)).await;
        harness.cancel_tx.send_replace(true);

        let result = handle.await.unwrap();
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert_eq!(result.attempts, 1);
        assert_eq!(harness.semaphore.available(), 1);
    }

    #[tokio::test]
    async fn zero_attempts_never_invokes_the_work() {
        let calls = Arc::new(AtomicU32::new(0));
        let work = {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TaskError::work("never")) }
            }
        };
        let (runner, harness) = runner(
            work,
            RetryPolicy::new(0, Duration::from_millis(1)),
            Duration::from_secs(1),
            TimeoutPolicy::PerAttempt,
        );

        let permit = harness.semaphore.try_acquire().unwrap();
        let result = runner.run(permit).await;

        assert_eq!(result.error, Some(TaskError::NoAttempts));
        assert_eq!(result.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.semaphore.available(), 1);
    }

    #[tokio::test]
    async fn panicking_progress_callback_is_contained() {
        let (mut runner, harness) = runner(
            || async { Ok::<_, TaskError>(5u8) },
            RetryPolicy::no_retry(),
            Duration::from_secs(1),
            TimeoutPolicy::PerAttempt,
        );
        fn explode(_: TaskProgress) {
            panic!("progress");
        }
        runner.on_progress = Some(Arc::new(explode));

        let permit = harness.semaphore.try_acquire().unwrap();
        let result = runner.run(permit).await;

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.value, Some(5));
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }
}
