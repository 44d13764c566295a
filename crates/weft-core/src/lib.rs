//! weft-core
//!
//! In-process concurrency manager: bounded parallelism, priorities,
//! dependencies, retries with backoff, timeouts and cancellation.
//!
//! # Modules
//! - **domain**: domain model (ids, priority, status, task specs, results, records, errors, events)
//! - **ports**: abstraction layer (Clock, IdGenerator, EventSink)
//! - **queue**: admission primitives (PriorityQueue, Semaphore, DependencyResolver, RetryPolicy)
//! - **app**: the manager (submission, admission, runner, composite operations, config, builder)
//! - **impls**: port implementations (TracingEventSink, BroadcastEventSink, MemoryEventSink)

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{
    ConcurrencyManager, ConcurrencyMetrics, ConfigError, ManagerBuilder, ManagerConfig, Pipeline,
    TaskHandle,
};
pub use domain::{
    ManagerError, Priority, TaskError, TaskEvent, TaskId, TaskOptions, TaskProgress, TaskRecord,
    TaskResult, TaskSpec, TaskStatus, Work,
};
pub use queue::{RetryPolicy, TimeoutPolicy};
