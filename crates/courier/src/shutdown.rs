//! One-shot shutdown broadcast plus outstanding-worker tracking.
//!
//! [`ShutdownCoordinator::fire`] cancels a shared [`CancellationToken`], which
//! every waiter observes (broadcast, no missed wakeups). Workers register
//! through [`ShutdownCoordinator::register`] *before* they are spawned and hold
//! the returned [`WorkerGuard`] for their whole lifetime; dropping the guard is
//! the worker's single "done" signal, whichever exit path it took.

use crate::metrics;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

struct Inner {
    token: CancellationToken,
    fired: AtomicBool,
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Cloneable handle to the shared shutdown state.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("fired", &self.is_fired())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                fired: AtomicBool::new(false),
                outstanding: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Fires the shutdown signal. Only the first call has any effect.
    pub fn fire(&self) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            tracing::debug!("Shutdown already fired");
            return;
        }
        tracing::info!(
            outstanding = self.outstanding(),
            "Shutdown fired, waiting for workers to drain"
        );
        self.inner.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once [`fire`](Self::fire) has been called.
    pub fn fired(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// The token cancelled by [`fire`](Self::fire), for `select!` loops.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Number of registered workers that have not reached `Done`.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Registers one worker. Call before spawning it and move the guard into
    /// the task.
    pub fn register(&self, worker_id: usize) -> WorkerGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        metrics::add_workers_outstanding(1);
        WorkerGuard {
            inner: Arc::clone(&self.inner),
            worker_id,
        }
    }

    /// Waits until every registered worker has dropped its guard.
    ///
    /// Returns immediately if nothing is outstanding.
    pub async fn wait(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Proof of registration held by a running worker.
///
/// Dropping it decrements the outstanding count exactly once, including when
/// the worker task panics or is aborted.
#[must_use = "dropping the guard marks the worker as done"]
pub struct WorkerGuard {
    inner: Arc<Inner>,
    worker_id: usize,
}

impl WorkerGuard {
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let previous = self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
        metrics::add_workers_outstanding(-1);
        tracing::trace!(worker_id = self.worker_id, "Worker released");
        if previous == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[tokio::test]
    async fn fire_is_idempotent() {
        let shutdown = ShutdownCoordinator::new();
        assert!(!shutdown.is_fired());
        shutdown.fire();
        shutdown.fire();
        assert!(shutdown.is_fired());
        shutdown.fired().await;
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_idle() {
        let shutdown = ShutdownCoordinator::new();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("idle coordinator should not block");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_blocks_until_every_guard_drops() {
        let shutdown = ShutdownCoordinator::new();
        let mut handles = Vec::new();

        for worker_id in 0..4 {
            let guard = shutdown.register(worker_id);
            let token = shutdown.token().clone();
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                token.cancelled().await;
                // Stagger exits so `wait` sees several partial drains.
                tokio::time::sleep(Duration::from_millis(10 * worker_id as u64)).await;
            }));
        }

        assert_eq!(shutdown.outstanding(), 4);
        shutdown.fire();
        shutdown.wait().await;
        assert_eq!(shutdown.outstanding(), 0);

        for handle in handles {
            assert!(handle.is_finished() || handle.await.is_ok());
        }
    }

    #[tokio::test]
    async fn guard_released_on_panic() {
        let shutdown = ShutdownCoordinator::new();
        let guard = shutdown.register(0);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("worker blew up");
        });
        assert!(handle.await.is_err());
        assert_eq!(shutdown.outstanding(), 0);
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn all_waiters_observe_fire() {
        let shutdown = ShutdownCoordinator::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let shutdown = shutdown.clone();
                tokio::spawn(async move { shutdown.fired().await })
            })
            .collect();
        tokio::task::yield_now().await;
        shutdown.fire();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter missed the signal")
                .unwrap();
        }
    }
}
