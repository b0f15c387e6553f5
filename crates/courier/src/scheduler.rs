//! The producer's cooperative timer loop.
//!
//! A [`Scheduler`] waits one interval, runs one [`Cycle`] to completion, and
//! repeats until the shutdown signal fires or an optional cycle limit is
//! reached. The delay is measured from the end of the previous cycle, so
//! cycles never overlap and a slow cycle pushes the next one back instead of
//! queueing ticks.

use crate::{Error, Result, ShutdownCoordinator, metrics};
use core::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// One unit of periodic work.
pub trait Cycle: Send {
    /// Runs one dispatch cycle.
    ///
    /// # Errors
    ///
    /// Any error is logged by the scheduler and the cycle is treated as a
    /// no-op; the loop carries on with the next tick.
    fn run(&mut self) -> impl Future<Output = Result<()>> + Send;
}

impl<C: Cycle> Cycle for &mut C {
    fn run(&mut self) -> impl Future<Output = Result<()>> + Send {
        (**self).run()
    }
}

#[derive(Clone, Debug)]
pub struct Scheduler {
    interval: Duration,
    shutdown: ShutdownCoordinator,
    max_cycles: Option<u64>,
}

impl Scheduler {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `interval` is zero.
    pub fn new(interval: Duration, shutdown: ShutdownCoordinator) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::invalid_configuration(
                "poll interval must be greater than 0",
            ));
        }
        Ok(Self {
            interval,
            shutdown,
            max_cycles: None,
        })
    }

    /// Stops the loop on its own after `max_cycles` cycles. `None` runs until
    /// shutdown.
    #[must_use]
    pub const fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Drives `cycle` until shutdown fires or the cycle limit is reached.
    ///
    /// The shutdown signal is checked before every tick and wins a tie with
    /// it. A cycle already running is never interrupted. Returns the number of
    /// cycles started, failed ones included.
    pub async fn run<C: Cycle>(&self, mut cycle: C) -> u64 {
        let mut started: u64 = 0;
        tracing::info!(
            interval = ?self.interval,
            max_cycles = ?self.max_cycles,
            "Scheduler started"
        );

        loop {
            if self.max_cycles.is_some_and(|max| started >= max) {
                tracing::info!(cycles = started, "Cycle limit reached");
                break;
            }

            tokio::select! {
                biased;
                () = self.shutdown.fired() => {
                    tracing::info!(cycles = started, "Scheduler stopping");
                    break;
                }
                () = tokio::time::sleep(self.interval) => {}
            }

            started += 1;
            metrics::increment_cycles();
            let begin = Instant::now();
            let span = tracing::info_span!("cycle", cycle = started);

            if let Err(e) = cycle.run().instrument(span).await {
                metrics::increment_cycle_errors();
                tracing::error!(cycle = started, error = %e, "Dispatch cycle failed, skipping");
            }
            metrics::record_cycle_duration(begin.elapsed().as_secs_f64() * 1000.0);
        }

        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        runs: Arc<AtomicUsize>,
        fail: bool,
        work: Option<Duration>,
    }

    impl Cycle for Counting {
        async fn run(&mut self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::AcqRel);
            if let Some(work) = self.work {
                tokio::time::sleep(work).await;
            }
            if self.fail {
                return Err(Error::UpstreamFetch {
                    reason: "503 Service Unavailable".into(),
                });
            }
            Ok(())
        }
    }

    fn scheduler(millis: u64) -> (Scheduler, ShutdownCoordinator) {
        let shutdown = ShutdownCoordinator::new();
        let scheduler = Scheduler::new(Duration::from_millis(millis), shutdown.clone()).unwrap();
        (scheduler, shutdown)
    }

    #[test]
    fn zero_interval_is_invalid() {
        assert!(matches!(
            Scheduler::new(Duration::ZERO, ShutdownCoordinator::new()),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_exactly_max_cycles() {
        let (scheduler, _shutdown) = scheduler(100);
        let cycle = Counting::default();
        let runs = Arc::clone(&cycle.runs);

        let started = scheduler.with_max_cycles(Some(3)).run(cycle).await;

        assert_eq!(started, 3);
        assert_eq!(runs.load(Ordering::Acquire), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_cycles_do_not_stop_the_loop() {
        let (scheduler, _shutdown) = scheduler(100);
        let cycle = Counting {
            fail: true,
            ..Counting::default()
        };
        let runs = Arc::clone(&cycle.runs);

        let started = scheduler.with_max_cycles(Some(5)).run(cycle).await;

        assert_eq!(started, 5);
        assert_eq!(runs.load(Ordering::Acquire), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_waits_one_interval() {
        let (scheduler, shutdown) = scheduler(1_000);
        let cycle = Counting::default();
        let runs = Arc::clone(&cycle.runs);
        let handle = tokio::spawn(async move { scheduler.run(cycle).await });

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(runs.load(Ordering::Acquire), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(runs.load(Ordering::Acquire), 1);

        shutdown.fire();
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop_promptly() {
        let (scheduler, shutdown) = scheduler(60 * 60 * 1_000);
        let cycle = Counting::default();
        let runs = Arc::clone(&cycle.runs);
        let handle = tokio::spawn(async move { scheduler.run(cycle).await });

        tokio::task::yield_now().await;
        shutdown.fire();

        let started = tokio::time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("scheduler should observe shutdown without waiting for the tick")
            .unwrap();
        assert_eq!(started, 0);
        assert_eq!(runs.load(Ordering::Acquire), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn running_cycle_completes_before_the_loop_exits() {
        let (scheduler, shutdown) = scheduler(10);
        let cycle = Counting {
            work: Some(Duration::from_millis(500)),
            ..Counting::default()
        };
        let runs = Arc::clone(&cycle.runs);
        let handle = tokio::spawn(async move { scheduler.run(cycle).await });

        // Mid-way through the first cycle.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::Acquire), 1);
        shutdown.fire();

        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(runs.load(Ordering::Acquire), 1);
    }
}
