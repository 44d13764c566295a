//! Task definitions: the work trait, options and the submitted spec.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::errors::TaskError;
use super::ids::TaskId;
use super::priority::Priority;
use crate::queue::{RetryPolicy, TimeoutPolicy};

/// Values a task may produce.
///
/// Results are shared between the handle, composite operations and
/// dependants, so they must be cloneable and thread-safe.
pub trait TaskValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> TaskValue for T {}

/// The unit of work a task executes.
///
/// `run` is called once per attempt, so it must be repeatable. Closures of
/// the form `|| async { ... }` implement this trait automatically.
///
/// # Example
/// ```ignore
/// struct Fetch { url: String }
///
/// #[async_trait]
/// impl Work<String> for Fetch {
///     async fn run(&self) -> Result<String, TaskError> {
///         Ok(format!("fetched {}", self.url))
///     }
/// }
/// ```
#[async_trait]
pub trait Work<T>: Send + Sync {
    async fn run(&self) -> Result<T, TaskError>;
}

#[async_trait]
impl<T, F, Fut> Work<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    async fn run(&self) -> Result<T, TaskError> {
        (self)().await
    }
}

/// Progress notification passed to a task's progress callback at the start
/// of every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub attempt: u32,
    pub max_attempts: u32,
}

pub type ProgressCallback = Arc<dyn Fn(TaskProgress) + Send + Sync>;

pub type CancelCallback = Arc<dyn Fn(TaskId) + Send + Sync>;

/// Scheduling options of a task. Unset fields use the manager defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub priority: Priority,
    pub dependencies: Vec<TaskId>,
    pub timeout: Option<Duration>,
    pub timeout_policy: Option<TimeoutPolicy>,
    pub retry: Option<RetryPolicy>,
}

impl TaskOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// A task as submitted to the manager.
///
/// # Example
/// ```ignore
/// let spec = TaskSpec::new(|| async { Ok::<_, TaskError>(42) })
///     .with_priority(Priority::High)
///     .with_timeout(Duration::from_secs(5))
///     .depends_on(upstream.id());
/// ```
pub struct TaskSpec<T> {
    pub(crate) name: Option<String>,
    pub(crate) options: TaskOptions,
    pub(crate) work: Arc<dyn Work<T>>,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) on_cancel: Option<CancelCallback>,
}

impl<T: TaskValue> TaskSpec<T> {
    pub fn new<W: Work<T> + 'static>(work: W) -> Self {
        Self {
            name: None,
            options: TaskOptions::default(),
            work: Arc::new(work),
            on_progress: None,
            on_cancel: None,
        }
    }

    /// Label used in logs, events and records.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn depends_on(mut self, dependency: TaskId) -> Self {
        self.options.dependencies.push(dependency);
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.options.dependencies.extend(dependencies);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.options.timeout_policy = Some(policy);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = Some(retry);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(TaskProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_cancel(mut self, callback: impl Fn(TaskId) + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(callback));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }
}

impl<T> fmt::Debug for TaskSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    struct Constant(u32);

    #[async_trait]
    impl Work<u32> for Constant {
        async fn run(&self) -> Result<u32, TaskError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn closures_and_structs_are_work() {
        let closure = || async { Ok::<_, TaskError>(7u32) };
        assert_eq!(closure.run().await, Ok(7));
        assert_eq!(Constant(3).run().await, Ok(3));
    }

    #[test]
    fn builder_collects_options() {
        let upstream = TaskId::from(Ulid::new());
        let spec = TaskSpec::new(Constant(1))
            .named("fetch")
            .with_priority(Priority::High)
            .depends_on(upstream)
            .with_timeout(Duration::from_secs(2))
            .with_retry(RetryPolicy::no_retry());

        assert_eq!(spec.name(), Some("fetch"));
        assert_eq!(spec.options().priority, Priority::High);
        assert_eq!(spec.options().dependencies, vec![upstream]);
        assert_eq!(spec.options().timeout, Some(Duration::from_secs(2)));
        assert_eq!(spec.options().retry.as_ref().map(|r| r.max_attempts), Some(1));
        assert!(format!("{spec:?}").contains("fetch"));
    }
}
