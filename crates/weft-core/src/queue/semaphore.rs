//! Counting semaphore bounding how many tasks run at once.
//!
//! # 実装
//! - tokio の Semaphore（FIFO で公平）を薄く包む
//! - permit は drop でも返却される

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, TryAcquireError};

/// The semaphore was closed (manager shut down) while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("semaphore closed")]
pub struct SemaphoreClosed;

/// Fair counting semaphore.
///
/// Waiters are served in arrival order (tokio's semaphore is FIFO), and a
/// released permit goes straight to the oldest waiter. The available count
/// never exceeds the capacity because permits only come back through
/// [`SlotPermit`] drops.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<tokio::sync::Semaphore>,
    capacity: usize,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a permit without waiting.
    ///
    /// Returns `None` when no permit is free, or when queued waiters exist
    /// (they are served first).
    pub fn try_acquire(&self) -> Option<SlotPermit> {
        match self.inner.clone().try_acquire_owned() {
            Ok(permit) => Some(SlotPermit(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    /// Wait for a permit.
    pub async fn acquire(&self) -> Result<SlotPermit, SemaphoreClosed> {
        self.inner
            .clone()
            .acquire_owned()
            .await
            .map(SlotPermit)
            .map_err(|_| SemaphoreClosed)
    }

    /// Wake every waiter with [`SemaphoreClosed`]. Permits already held stay
    /// valid.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

/// A held execution slot. Dropping it returns the slot.
#[derive(Debug)]
pub struct SlotPermit(OwnedSemaphorePermit);

impl SlotPermit {
    /// Return the slot explicitly.
    pub fn release(self) {
        drop(self);
    }
}
