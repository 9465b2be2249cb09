//! Admission gate bounding concurrent page navigations.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use chatscribe_core::{Error, Result};

/// Counting gate shared by every target. FIFO-fair: waiters are admitted in
/// arrival order, so none is starved by holders that release promptly.
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted slot. Dropping it releases the slot, on every exit path.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl RequestLimiter {
    /// Gate admitting at most `capacity` holders (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<LimiterPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("request limiter closed".into()))?;
        Ok(LimiterPermit { _permit: permit })
    }

    /// Run `operation` while holding a slot.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;
        operation.await
    }
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(3)
    }
}
