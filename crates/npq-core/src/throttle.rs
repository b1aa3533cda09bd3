//! Shared concurrency limiter.
//!
//! Bounds how many operations run at once and keeps each one occupying its
//! permit for at least `min_delay` from the moment it started. Waiters are
//! served in FIFO order by the underlying semaphore. One instance is
//! created per run and handed to every caller that opts in.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::trace;

/// Default number of operations allowed in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Concurrency limiter handle. Clones share state.
#[derive(Debug, Clone)]
pub struct Throttle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    limits: Mutex<Limits>,
}

#[derive(Debug)]
struct Limits {
    max_concurrent: usize,
    min_delay: Duration,
    running: usize,
    /// Permits still checked out that must be retired when they come back,
    /// left over from shrinking the limit.
    pending_shrink: usize,
}

/// One checked-out permit. Dropping it returns the permit, or retires it
/// while a shrink is pending.
struct Slot {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<Inner>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, Duration::ZERO)
    }
}

impl Throttle {
    /// Create a limiter. A `max_concurrent` of zero is treated as one.
    #[must_use]
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                limits: Mutex::new(Limits {
                    max_concurrent,
                    min_delay,
                    running: 0,
                    pending_shrink: 0,
                }),
            }),
        }
    }

    /// Replace the configuration. Applies to every later scheduling
    /// decision, including operations already waiting; the last call wins.
    pub fn configure(&self, max_concurrent: usize, min_delay: Duration) {
        let max_concurrent = max_concurrent.max(1);
        let mut limits = self.inner.lock();

        if max_concurrent > limits.max_concurrent {
            let grow = max_concurrent - limits.max_concurrent;
            let cancelled = grow.min(limits.pending_shrink);
            limits.pending_shrink -= cancelled;
            self.inner.semaphore.add_permits(grow - cancelled);
        } else if max_concurrent < limits.max_concurrent {
            let shrink = limits.max_concurrent - max_concurrent;
            let forgotten = self.inner.semaphore.forget_permits(shrink);
            limits.pending_shrink += shrink - forgotten;
        }

        limits.max_concurrent = max_concurrent;
        limits.min_delay = min_delay;
        trace!(max_concurrent, ?min_delay, "throttle configured");
    }

    /// Current `(max_concurrent, min_delay)`.
    #[must_use]
    pub fn limits(&self) -> (usize, Duration) {
        let limits = self.inner.lock();
        (limits.max_concurrent, limits.min_delay)
    }

    /// Operations currently holding a permit.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Permits free right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Run `operation` once a permit is free.
    ///
    /// The output (including an `Err`) is handed back untouched; a failing
    /// operation only affects its own caller. The permit is held until
    /// `min_delay` has elapsed since the operation started.
    pub async fn throttle<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // The semaphore is never closed.
        let permit = Arc::clone(&self.inner.semaphore).acquire_owned().await.ok();
        let slot = Slot::new(permit, Arc::clone(&self.inner));
        let started = Instant::now();

        let output = operation().await;

        let min_delay = self.inner.lock().min_delay;
        let elapsed = started.elapsed();
        if elapsed < min_delay {
            tokio::time::sleep(min_delay - elapsed).await;
        }

        drop(slot);
        output
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Limits> {
        self.limits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Slot {
    fn new(permit: Option<OwnedSemaphorePermit>, inner: Arc<Inner>) -> Self {
        let mut limits = inner.lock();
        limits.running += 1;
        trace!(running = limits.running, "throttle permit taken");
        drop(limits);
        Self { permit, inner }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut limits = self.inner.lock();
        limits.running = limits.running.saturating_sub(1);
        let Some(permit) = self.permit.take() else {
            return;
        };
        if limits.pending_shrink > 0 {
            limits.pending_shrink -= 1;
            permit.forget();
            trace!(pending = limits.pending_shrink, "throttle permit retired");
        } else {
            drop(permit);
            trace!(running = limits.running, "throttle permit released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        async fn hold(&self, duration: Duration) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(duration).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_never_exceeds_max_concurrent() {
        let throttle = Throttle::new(2, Duration::ZERO);
        let gauge = Arc::new(Gauge::default());

        let ops = (0..6).map(|_| {
            let gauge = Arc::clone(&gauge);
            throttle.throttle(move || async move { gauge.hold(Duration::from_millis(20)).await })
        });
        futures::future::join_all(ops).await;

        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        assert_eq!(throttle.running(), 0);
        assert_eq!(throttle.available(), 2);
    }

    #[tokio::test]
    async fn test_min_delay_spaces_operations() {
        let throttle = Throttle::new(1, Duration::from_millis(50));
        let start = Instant::now();

        let ops = (0..3).map(|i| throttle.throttle(move || async move { i }));
        let results = futures::future::join_all(ops).await;

        assert_eq!(results, vec![0, 1, 2]);
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_failure_only_affects_its_own_caller() {
        let throttle = Throttle::new(1, Duration::ZERO);

        let ops = (0..4).map(|i| {
            throttle.throttle(move || async move {
                if i == 1 {
                    Err(format!("op {i} failed"))
                } else {
                    Ok(i)
                }
            })
        });
        let results = futures::future::join_all(ops).await;

        assert_eq!(results[0], Ok(0));
        assert_eq!(results[1], Err("op 1 failed".to_string()));
        assert_eq!(results[2], Ok(2));
        assert_eq!(results[3], Ok(3));
    }

    #[tokio::test]
    async fn test_reconfigure_releases_waiters() {
        let throttle = Throttle::new(1, Duration::ZERO);
        let gauge = Arc::new(Gauge::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let throttle = throttle.clone();
                let gauge = Arc::clone(&gauge);
                tokio::spawn(async move {
                    throttle
                        .throttle(move || async move { gauge.hold(Duration::from_millis(100)).await })
                        .await;
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(throttle.running(), 1);
        assert_eq!(throttle.available(), 0);

        throttle.configure(4, Duration::ZERO);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(gauge.peak.load(Ordering::SeqCst), 4);
        assert_eq!(throttle.limits(), (4, Duration::ZERO));
    }

    fn hold_all(throttle: &Throttle, count: usize, gauge: &Arc<Gauge>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..count)
            .map(|_| {
                let throttle = throttle.clone();
                let gauge = Arc::clone(gauge);
                tokio::spawn(async move {
                    throttle
                        .throttle(move || async move { gauge.hold(Duration::from_millis(80)).await })
                        .await;
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_shrinking_retires_permits_as_they_return() {
        let throttle = Throttle::new(3, Duration::ZERO);
        let busy = Arc::new(Gauge::default());

        let handles = hold_all(&throttle, 3, &busy);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(throttle.running(), 3);

        throttle.configure(1, Duration::ZERO);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(throttle.available(), 1);

        let gauge = Arc::new(Gauge::default());
        for handle in hold_all(&throttle, 3, &gauge) {
            handle.await.unwrap();
        }
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_growing_cancels_pending_shrink() {
        let throttle = Throttle::new(3, Duration::ZERO);
        let busy = Arc::new(Gauge::default());

        let handles = hold_all(&throttle, 3, &busy);
        tokio::time::sleep(Duration::from_millis(20)).await;

        throttle.configure(1, Duration::ZERO);
        throttle.configure(2, Duration::ZERO);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(throttle.available(), 2);
        assert_eq!(throttle.limits(), (2, Duration::ZERO));
    }

    #[tokio::test]
    async fn test_panicking_operation_frees_its_slot() {
        let throttle = Throttle::new(1, Duration::ZERO);

        let panicking = throttle.clone();
        let joined = tokio::spawn(async move {
            panicking
                .throttle(|| async { panic!("boom") })
                .await
        })
        .await;
        assert!(joined.is_err());

        let next = tokio::time::timeout(
            Duration::from_secs(1),
            throttle.throttle(|| async { "ran" }),
        )
        .await;
        assert_eq!(next.unwrap(), "ran");
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_leak_slot() {
        let throttle = Throttle::new(1, Duration::ZERO);

        let holder = throttle.clone();
        let running = tokio::spawn(async move {
            holder
                .throttle(|| tokio::time::sleep(Duration::from_millis(50)))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            throttle.throttle(|| async {}),
        )
        .await;
        assert!(abandoned.is_err());

        running.await.unwrap();
        let next = tokio::time::timeout(
            Duration::from_secs(1),
            throttle.throttle(|| async { 7 }),
        )
        .await;
        assert_eq!(next.unwrap(), 7);
        assert_eq!(throttle.running(), 0);
    }

    #[test]
    fn test_zero_max_is_clamped() {
        let throttle = Throttle::new(0, Duration::ZERO);
        assert_eq!(throttle.limits().0, 1);
    }
}
