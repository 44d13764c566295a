//! Queue module: admission primitives used by the manager.
//!
//! - [`PriorityQueue`]: stable priority ordering of tasks waiting for a slot
//! - [`Semaphore`]: FIFO counting semaphore bounding concurrency
//! - [`DependencyResolver`]: status channels and prerequisite waits
//! - [`RetryPolicy`] / [`TimeoutPolicy`]: attempt caps, backoff, timeout scope

mod dependency;
mod priority;
mod retry;
mod semaphore;

pub use dependency::{DependencyResolver, DependencyWatch, Readiness, readiness, wait_all};
pub use priority::PriorityQueue;
pub use retry::{RetryPolicy, TimeoutPolicy};
pub use semaphore::{Semaphore, SemaphoreClosed, SlotPermit};
