//! ConcurrencyManager - admission, bookkeeping and cancellation.
//!
//! Design:
//! - One `tokio::sync::Mutex` guards the queue, records, running set,
//!   dependency resolver and cancel signals; nothing awaits while holding it
//! - A task's typed half (runner + result channel) is erased into a
//!   [`Launch`] closure. Whoever holds the closure decides the task's outcome:
//!   the queue, a dependency waiter, or the admission loop
//! - Admission: while the queue is non-empty and a slot is free, dequeue,
//!   mark running, spawn. Every completion re-runs admission
//! - 実行中タスクのキャンセルは協調的（work 側の await 地点で止まる）

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, watch};
use tokio::time;
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::handle::TaskHandle;
use super::metrics::ConcurrencyMetrics;
use super::runner::{TaskRunner, cancelled, panic_message};
use crate::domain::{
    ManagerError, TaskError, TaskEvent, TaskId, TaskRecord, TaskResult, TaskSpec, TaskStatus,
    TaskValue,
};
use crate::ports::{Clock, EventBus, IdGenerator};
use crate::queue::{
    DependencyResolver, DependencyWatch, PriorityQueue, Readiness, Semaphore, SlotPermit,
    readiness, wait_all,
};

/// How a task leaves the pending state.
pub(crate) enum Admission {
    Run(SlotPermit),
    Cancel,
    Reject(TaskError),
}

type Launch = Box<dyn FnOnce(Admission) -> BoxFuture<'static, ()> + Send>;

struct QueuedTask {
    task_id: TaskId,
    launch: Launch,
}

struct ManagerState {
    queue: PriorityQueue<QueuedTask>,
    records: HashMap<TaskId, TaskRecord>,
    /// Submission order.
    order: Vec<TaskId>,
    running: HashSet<TaskId>,
    /// Present until the task's result is recorded.
    cancel_signals: HashMap<TaskId, watch::Sender<bool>>,
    resolver: DependencyResolver,
    shut_down: bool,
}

pub(crate) struct Inner {
    config: ManagerConfig,
    semaphore: Semaphore,
    state: Mutex<ManagerState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: EventBus,
}

/// Schedules tasks under a concurrency limit.
///
/// Cheap to clone; clones share the same state.
///
/// # Example
/// ```ignore
/// let manager = ConcurrencyManager::new(ManagerConfig::default().with_max_concurrency(2))?;
/// let handle = manager.submit(TaskSpec::new(|| async { Ok::<_, TaskError>(1) })).await;
/// assert!(handle.wait().await.is_completed());
/// ```
#[derive(Clone)]
pub struct ConcurrencyManager {
    inner: Arc<Inner>,
}

enum Next {
    Admit,
    Cancel(Launch),
    Reject(Launch, TaskError),
    Wait(Launch, Vec<DependencyWatch>),
}

impl ConcurrencyManager {
    pub(crate) fn from_parts(
        config: ManagerConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        events: EventBus,
    ) -> Self {
        let semaphore = Semaphore::new(config.max_concurrency);
        let state = ManagerState {
            queue: PriorityQueue::new(),
            records: HashMap::new(),
            order: Vec::new(),
            running: HashSet::new(),
            cancel_signals: HashMap::new(),
            resolver: DependencyResolver::new(),
            shut_down: false,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                semaphore,
                state: Mutex::new(state),
                clock,
                ids,
                events,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Submit a task.
    ///
    /// The task is queued immediately if its dependencies are complete,
    /// otherwise once they are. Never fails: rejections (unknown or failed
    /// dependency, shutdown) are reported through the handle.
    pub async fn submit<T: TaskValue>(&self, spec: TaskSpec<T>) -> TaskHandle<T> {
        let TaskSpec {
            name,
            options,
            work,
            on_progress,
            on_cancel,
        } = spec;
        let config = &self.inner.config;
        let retry = options.retry.unwrap_or_else(|| config.retry.clone());
        let max_attempts = retry.max_attempts;
        let weight = options.priority.weight();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (result_tx, result_rx) = watch::channel(None);

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let task_id = loop {
            let id = self.inner.ids.generate_task_id();
            if !state.records.contains_key(&id) {
                break id;
            }
        };
        let runner = TaskRunner {
            task_id,
            work,
            retry,
            timeout: options.timeout.unwrap_or_else(|| config.default_timeout()),
            timeout_policy: options.timeout_policy.unwrap_or(config.timeout_policy),
            on_progress,
            on_cancel,
            cancel_rx: cancel_rx.clone(),
            clock: Arc::clone(&self.inner.clock),
            events: self.inner.events.clone(),
        };
        let launch = self.launcher(runner, result_tx);

        state.records.insert(
            task_id,
            TaskRecord::new(
                task_id,
                name.clone(),
                options.priority,
                options.dependencies.clone(),
                max_attempts,
                self.inner.clock.now(),
            ),
        );
        state.order.push(task_id);
        state.resolver.register(task_id);
        state.cancel_signals.insert(task_id, cancel_tx);
        self.inner.events.emit(TaskEvent::Submitted {
            task_id,
            name,
            priority: options.priority,
        });
        debug!(
            %task_id,
            priority = %options.priority,
            dependencies = options.dependencies.len(),
            "task submitted"
        );

        let next = if state.shut_down {
            Next::Cancel(launch)
        } else if max_attempts == 0 {
            Next::Reject(launch, TaskError::NoAttempts)
        } else {
            match state.resolver.watch(&options.dependencies) {
                Err(error) => Next::Reject(launch, error),
                Ok(watches) => match readiness(&watches) {
                    Readiness::Ready => {
                        state.queue.enqueue(QueuedTask { task_id, launch }, weight);
                        Next::Admit
                    }
                    Readiness::Failed(error) => Next::Reject(launch, error),
                    Readiness::Waiting => Next::Wait(launch, watches),
                },
            }
        };
        drop(guard);

        match next {
            Next::Admit => self.admit().await,
            Next::Cancel(launch) => launch(Admission::Cancel).await,
            Next::Reject(launch, error) => launch(Admission::Reject(error)).await,
            Next::Wait(launch, watches) => {
                let manager = self.clone();
                tokio::spawn(async move {
                    manager
                        .await_dependencies(task_id, weight, watches, cancel_rx, launch)
                        .await;
                });
            }
        }

        TaskHandle::new(task_id, result_rx)
    }

    /// Request cancellation.
    ///
    /// - queued: removed from the queue and never run
    /// - waiting on dependencies: stops waiting
    /// - running: signalled; the runner stops at its next await point
    ///
    /// Returns false for unknown or terminal tasks, and when cancellation was
    /// already requested.
    pub async fn cancel_task(&self, task_id: TaskId) -> bool {
        let queued = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let Some(signal) = state.cancel_signals.get(&task_id) else {
                return false;
            };
            if signal.send_replace(true) {
                return false;
            }
            state.queue.remove(|queued| queued.task_id == task_id)
        };
        debug!(%task_id, queued = queued.is_some(), "cancellation requested");

        if let Some(queued) = queued {
            (queued.launch)(Admission::Cancel).await;
        }
        true
    }

    pub async fn get_task_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        let state = self.inner.state.lock().await;
        state.records.get(&task_id).map(|record| record.status)
    }

    pub async fn task_record(&self, task_id: TaskId) -> Option<TaskRecord> {
        let state = self.inner.state.lock().await;
        state.records.get(&task_id).cloned()
    }

    /// Every record, in submission order.
    pub async fn task_records(&self) -> Vec<TaskRecord> {
        let state = self.inner.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|task_id| state.records.get(task_id).cloned())
            .collect()
    }

    /// Wait until a task is terminal and return its record.
    pub async fn await_terminal(&self, task_id: TaskId) -> Result<TaskRecord, ManagerError> {
        let mut rx = {
            let state = self.inner.state.lock().await;
            state
                .resolver
                .subscribe(task_id)
                .ok_or(ManagerError::TaskNotFound(task_id))?
        };
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.task_record(task_id)
            .await
            .ok_or(ManagerError::TaskNotFound(task_id))
    }

    pub async fn get_metrics(&self) -> ConcurrencyMetrics {
        let state = self.inner.state.lock().await;
        ConcurrencyMetrics::compute(
            state.records.values(),
            state.running.len(),
            self.inner.semaphore.capacity(),
            self.inner.clock.now(),
            self.inner.config.throughput_window(),
        )
    }

    /// Stop admitting work and cancel every non-terminal task.
    ///
    /// Running tasks are signalled, not awaited. Tasks submitted afterwards
    /// end as cancelled.
    pub async fn shutdown(&self) {
        let queued: Vec<QueuedTask> = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            self.inner.semaphore.close();
            for signal in state.cancel_signals.values() {
                signal.send_replace(true);
            }
            std::iter::from_fn(|| state.queue.dequeue()).collect()
        };
        info!(
            queued = queued.len(),
            "manager shutting down, outstanding tasks cancelled"
        );

        for task in queued {
            (task.launch)(Admission::Cancel).await;
        }
    }

    /// Erase a typed runner into a launch closure.
    ///
    /// The closure holds the manager weakly: queued tasks must not keep a
    /// dropped manager alive. Their handles then resolve as abandoned.
    ///
    /// A panic escaping the runner still settles the task as failed, so
    /// its record, slot and dependants are never left behind.
    fn launcher<T: TaskValue>(
        &self,
        runner: TaskRunner<T>,
        result_tx: watch::Sender<Option<TaskResult<T>>>,
    ) -> Launch {
        let manager = Arc::downgrade(&self.inner);
        let task_id = runner.task_id;
        let clock = Arc::clone(&self.inner.clock);
        Box::new(move |admission| {
            Box::pin(async move {
                let settle = async move {
                    match admission {
                        Admission::Run(permit) => runner.run(permit).await,
                        Admission::Cancel => runner.cancel_unstarted(),
                        Admission::Reject(error) => runner.reject(error),
                    }
                };
                let result = match AssertUnwindSafe(settle).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        warn!(%task_id, %message, "task runner panicked");
                        TaskResult::failed(
                            task_id,
                            TaskError::Panicked { message },
                            0,
                            None,
                            clock.now(),
                        )
                    }
                };
                match manager.upgrade() {
                    Some(inner) => ConcurrencyManager { inner }.complete(result, &result_tx).await,
                    None => {
                        result_tx.send_replace(Some(result));
                    }
                }
            })
        })
    }

    /// Admission loop.
    async fn admit(&self) {
        let mut admitted = Vec::new();
        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            while !state.queue.is_empty() {
                let Some(permit) = self.inner.semaphore.try_acquire() else {
                    break;
                };
                let Some(task) = state.queue.dequeue() else {
                    break;
                };
                let now = self.inner.clock.now();
                if let Some(record) = state.records.get_mut(&task.task_id) {
                    record.mark_running(now);
                }
                state.running.insert(task.task_id);
                state.resolver.publish(task.task_id, TaskStatus::Running);
                admitted.push((task, permit));
            }
        }

        for (task, permit) in admitted {
            debug!(task_id = %task.task_id, "task admitted");
            tokio::spawn((task.launch)(Admission::Run(permit)));
        }
    }

    async fn await_dependencies(
        self,
        task_id: TaskId,
        weight: u32,
        watches: Vec<DependencyWatch>,
        mut cancel_rx: watch::Receiver<bool>,
        launch: Launch,
    ) {
        let limit = self.inner.config.dependency_timeout();
        let satisfied = async move {
            match limit {
                Some(after) => time::timeout(after, wait_all(watches))
                    .await
                    .unwrap_or(Err(TaskError::DependencyTimeout { after })),
                None => wait_all(watches).await,
            }
        };
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => None,
            outcome = satisfied => Some(outcome),
        };

        match outcome {
            None => launch(Admission::Cancel).await,
            Some(Err(error)) => {
                debug!(%task_id, %error, "dependencies not satisfied");
                launch(Admission::Reject(error)).await;
            }
            Some(Ok(())) => self.enqueue_ready(task_id, weight, &cancel_rx, launch).await,
        }
    }

    /// Queue a task whose dependencies just completed, unless it was
    /// cancelled in the meantime.
    async fn enqueue_ready(
        &self,
        task_id: TaskId,
        weight: u32,
        cancel_rx: &watch::Receiver<bool>,
        launch: Launch,
    ) {
        let rejected = {
            let mut state = self.inner.state.lock().await;
            if *cancel_rx.borrow() || state.shut_down {
                Some(launch)
            } else {
                state.queue.enqueue(QueuedTask { task_id, launch }, weight);
                None
            }
        };
        match rejected {
            Some(launch) => launch(Admission::Cancel).await,
            None => self.admit().await,
        }
    }

    /// Record a terminal result, deliver it, and admit more work.
    async fn complete<T: TaskValue>(
        &self,
        result: TaskResult<T>,
        result_tx: &watch::Sender<Option<TaskResult<T>>>,
    ) {
        let task_id = result.task_id;
        let settled = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            state.running.remove(&task_id);
            state.cancel_signals.remove(&task_id);
            let settled = state
                .records
                .get_mut(&task_id)
                .is_some_and(|record| record.settle(&result));
            if settled {
                state.resolver.publish(task_id, result.status);
            }
            settled
        };

        if settled {
            self.inner.events.emit(terminal_event(&result));
        }
        result_tx.send_replace(Some(result));
        self.admit().await;
    }
}

fn terminal_event<T>(result: &TaskResult<T>) -> TaskEvent {
    let task_id = result.task_id;
    match result.status {
        TaskStatus::Completed => TaskEvent::Completed {
            task_id,
            attempts: result.attempts,
        },
        TaskStatus::Cancelled => TaskEvent::Cancelled { task_id },
        _ => TaskEvent::Failed {
            task_id,
            error: result.error.clone().unwrap_or(TaskError::Abandoned),
        },
    }
}

impl std::fmt::Debug for ConcurrencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyManager")
            .field("config", &self.inner.config)
            .field("in_use", &self.inner.semaphore.in_use())
            .finish_non_exhaustive()
    }
}
