//! Dependency resolution between tasks.
//!
//! Design:
//! - Every submitted task owns a `watch` channel carrying its current status
//! - A dependant subscribes to its prerequisites' channels and waits until all
//!   of them are terminal; no polling
//! - Failure propagates: a prerequisite that ended as failed or cancelled
//!   fails the dependant with `DependencyFailed`, which in turn fails the
//!   dependant's own dependants
//!
//! Cycles cannot form: a dependency must already be registered when its
//! dependant is submitted, and ids are generated by the manager.

use std::collections::HashMap;

use futures::future::try_join_all;
use tokio::sync::watch;

use crate::domain::{TaskError, TaskId, TaskStatus};

/// Subscription to one prerequisite.
#[derive(Debug, Clone)]
pub struct DependencyWatch {
    dependency: TaskId,
    rx: watch::Receiver<TaskStatus>,
}

impl DependencyWatch {
    pub fn dependency(&self) -> TaskId {
        self.dependency
    }

    pub fn status(&self) -> TaskStatus {
        *self.rx.borrow()
    }

    async fn wait(mut self) -> Result<(), TaskError> {
        let status = match self.rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            // sender gone without a terminal status: treat as cancelled
            Err(_) => TaskStatus::Cancelled,
        };
        match status {
            TaskStatus::Completed => Ok(()),
            status => Err(TaskError::DependencyFailed {
                dependency: self.dependency,
                status,
            }),
        }
    }
}

/// Snapshot of a task's prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// All prerequisites completed.
    Ready,
    /// At least one prerequisite has not finished yet, none has failed.
    Waiting,
    /// A prerequisite ended as failed or cancelled.
    Failed(TaskError),
}

/// Tracks the status channel of every task known to the manager.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    channels: HashMap<TaskId, watch::Sender<TaskStatus>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a task as `Pending`.
    pub fn register(&mut self, task_id: TaskId) {
        self.channels
            .entry(task_id)
            .or_insert_with(|| watch::channel(TaskStatus::Pending).0);
    }

    /// Publish a status change. Unknown ids are ignored.
    pub fn publish(&self, task_id: TaskId, status: TaskStatus) {
        if let Some(tx) = self.channels.get(&task_id) {
            tx.send_replace(status);
        }
    }

    pub fn subscribe(&self, task_id: TaskId) -> Option<watch::Receiver<TaskStatus>> {
        self.channels.get(&task_id).map(watch::Sender::subscribe)
    }

    /// Subscribe to every prerequisite.
    ///
    /// Fails with `UnknownDependency` on the first id that was never
    /// registered.
    pub fn watch(&self, dependencies: &[TaskId]) -> Result<Vec<DependencyWatch>, TaskError> {
        dependencies
            .iter()
            .map(|&dependency| {
                self.subscribe(dependency)
                    .map(|rx| DependencyWatch { dependency, rx })
                    .ok_or(TaskError::UnknownDependency { dependency })
            })
            .collect()
    }
}

/// Evaluate prerequisites without waiting.
pub fn readiness(watches: &[DependencyWatch]) -> Readiness {
    let mut waiting = false;
    for prerequisite in watches {
        match prerequisite.status() {
            TaskStatus::Completed => {}
            status @ (TaskStatus::Failed | TaskStatus::Cancelled) => {
                return Readiness::Failed(TaskError::DependencyFailed {
                    dependency: prerequisite.dependency,
                    status,
                });
            }
            TaskStatus::Pending | TaskStatus::Running => waiting = true,
        }
    }
    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}

/// Wait until every prerequisite completed.
///
/// Returns as soon as any prerequisite ends as failed or cancelled, without
/// waiting for the rest.
pub async fn wait_all(watches: Vec<DependencyWatch>) -> Result<(), TaskError> {
    try_join_all(watches.into_iter().map(DependencyWatch::wait))
        .await
        .map(|_| ())
}
