//! Admission gate bounding concurrent download jobs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate owned by one controller
///
/// A limit of zero or less admits every job immediately.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Option<Arc<Semaphore>>,
    limit: usize,
    queued: AtomicUsize,
    active: Arc<AtomicUsize>,
}

/// Held while a job runs; dropping it releases the slot
#[derive(Debug)]
pub struct Admission {
    _permit: Option<OwnedSemaphorePermit>,
    active: Arc<AtomicUsize>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    pub fn new(limit: i64) -> Self {
        let (semaphore, limit) = if limit > 0 {
            let limit = limit as usize;
            (Some(Arc::new(Semaphore::new(limit))), limit)
        } else {
            (None, 0)
        };
        Self {
            semaphore,
            limit,
            queued: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `None` when unlimited
    pub fn limit(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|_| self.limit)
    }

    /// Whether a new job would have to wait
    pub fn is_saturated(&self) -> bool {
        self.semaphore
            .as_ref()
            .is_some_and(|s| s.available_permits() == 0)
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Admission {
        let permit = match &self.semaphore {
            // The semaphore is never closed, so acquisition only fails if
            // that invariant is broken; fall through unbounded in that case.
            Some(s) => s.clone().acquire_owned().await.ok(),
            None => None,
        };
        self.active.fetch_add(1, Ordering::SeqCst);
        Admission {
            _permit: permit,
            active: self.active.clone(),
        }
    }

    /// Count a waiting job; returns its estimated position
    pub fn enqueue(&self) -> usize {
        self.queued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn dequeue(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unlimited_gate_never_saturates() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.limit(), None);
        let a = gate.acquire().await;
        let b = gate.acquire().await;
        assert!(!gate.is_saturated());
        assert_eq!(gate.active(), 2);
        drop((a, b));
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn test_limit_blocks_until_release() {
        let gate = Arc::new(AdmissionGate::new(1));
        let first = gate.acquire().await;
        assert!(gate.is_saturated());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _admission = gate.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter admitted")
            .unwrap();
        assert_eq!(gate.active(), 0);
        assert!(!gate.is_saturated());
    }

    #[test]
    fn test_queue_counter_never_underflows() {
        let gate = AdmissionGate::new(2);
        assert_eq!(gate.enqueue(), 1);
        assert_eq!(gate.enqueue(), 2);
        gate.dequeue();
        gate.dequeue();
        gate.dequeue();
        assert_eq!(gate.queued(), 0);
    }
}
