use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Concurrency cap settings for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    pub max_concurrent_calls: usize,
    /// How long a caller may wait for a free slot. Zero rejects immediately.
    pub max_wait: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 10,
            max_wait: Duration::ZERO,
        }
    }
}

/// Semaphore-backed concurrency limit.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Semaphore,
    max_wait: Duration,
}

impl Bulkhead {
    pub fn new(config: &BulkheadConfig) -> Self {
        Self {
            semaphore: Semaphore::new(config.max_concurrent_calls),
            max_wait: config.max_wait,
        }
    }

    /// Takes a slot, or `None` if the bulkhead stayed full.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        if self.max_wait.is_zero() {
            return self.semaphore.try_acquire().ok();
        }
        match tokio::time::timeout(self.max_wait, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => Some(permit),
            _ => None,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
