//! Fixed-size pool of asynchronous workers.
//!
//! This module defines the [`WorkerPool`], which spawns exactly
//! `num_workers` Tokio tasks per invocation, one per worker index, and ties
//! each to the shared [`ShutdownCoordinator`].
//!
//! - **Producer mode** ([`WorkerPool::spawn_producers`]): each task receives
//!   one [`Partition`] for the current dispatch cycle, ships it, and exits.
//! - **Consumer mode** ([`WorkerPool::spawn_consumers`]): each task owns one
//!   [`Reader`] and polls until shutdown.
//!
//! Every task is registered with the coordinator before it is spawned, so
//! [`ShutdownCoordinator::wait`] never misses a worker that is about to start.
//! Once the shutdown signal has fired the pool refuses new work.

use super::worker::{PartitionReport, consumer_loop, produce_partition};
use crate::{
    BatchConfig, Error, Handler, Partition, Reader, Result, ShutdownCoordinator, Topics,
    WorkerGuard, Writer,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A pool of `num_workers` cooperative worker tasks.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    num_workers: usize,
    shutdown: ShutdownCoordinator,
}

impl WorkerPool {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `num_workers` is zero.
    pub fn new(num_workers: usize, shutdown: ShutdownCoordinator) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::invalid_configuration(
                "worker count must be greater than 0",
            ));
        }
        Ok(Self {
            num_workers,
            shutdown,
        })
    }

    pub const fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub const fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Registers `num_workers` guards, then refuses if shutdown has already
    /// fired. Registering first means a concurrent `wait()` either sees these
    /// workers or the signal was fired before they registered.
    fn register_all(&self) -> Result<Vec<WorkerGuard>> {
        let guards: Vec<_> = (0..self.num_workers)
            .map(|worker_id| self.shutdown.register(worker_id))
            .collect();

        if self.shutdown.is_fired() {
            return Err(Error::ServiceShutdown);
        }
        Ok(guards)
    }

    /// Spawns one producer task per partition.
    ///
    /// The tasks share `writer`; each builds its own batch accumulator.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if the number of partitions differs
    ///   from the pool size.
    /// - [`Error::ServiceShutdown`] if shutdown has fired. Nothing is spawned.
    pub fn spawn_producers<W: Writer>(
        &self,
        partitions: Vec<Partition>,
        writer: &Arc<W>,
        topics: &Arc<Topics>,
        batch: BatchConfig,
    ) -> Result<Vec<JoinHandle<PartitionReport>>> {
        if partitions.len() != self.num_workers {
            return Err(Error::invalid_configuration(format!(
                "expected {} partitions, got {}",
                self.num_workers,
                partitions.len()
            )));
        }

        let guards = self.register_all()?;
        let handles = partitions
            .into_iter()
            .zip(guards)
            .enumerate()
            .map(|(worker_id, (partition, guard))| {
                tokio::spawn(produce_partition(
                    worker_id,
                    partition,
                    Arc::clone(writer),
                    Arc::clone(topics),
                    batch,
                    guard,
                ))
            })
            .collect();

        Ok(handles)
    }

    /// Spawns the producers for one cycle and waits for all of them.
    ///
    /// A task that panicked is logged and left out of the returned reports.
    ///
    /// # Errors
    ///
    /// Same as [`spawn_producers`](Self::spawn_producers).
    pub async fn run_partitions<W: Writer>(
        &self,
        partitions: Vec<Partition>,
        writer: &Arc<W>,
        topics: &Arc<Topics>,
        batch: BatchConfig,
    ) -> Result<Vec<PartitionReport>> {
        let handles = self.spawn_producers(partitions, writer, topics, batch)?;

        let reports = futures::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(worker_id, joined)| match joined {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Producer worker aborted");
                    None
                }
            })
            .collect();

        Ok(reports)
    }

    /// Spawns one long-lived consumer task per worker.
    ///
    /// `connect` is called once per worker index to build that worker's
    /// reader. All readers are built before any task starts, so a failure
    /// leaves nothing running.
    ///
    /// # Errors
    ///
    /// - Whatever `connect` returns for the first failing worker.
    /// - [`Error::ServiceShutdown`] if shutdown has fired. `connect` is not
    ///   called, or the readers it built are closed.
    pub fn spawn_consumers<R, H, F>(
        &self,
        mut connect: F,
        handler: &Arc<H>,
        poll_interval: Duration,
    ) -> Result<Vec<JoinHandle<()>>>
    where
        R: Reader,
        H: Handler,
        F: FnMut(usize) -> Result<R>,
    {
        if self.shutdown.is_fired() {
            return Err(Error::ServiceShutdown);
        }
        let readers = (0..self.num_workers)
            .map(&mut connect)
            .collect::<Result<Vec<R>>>()?;

        let guards = match self.register_all() {
            Ok(guards) => guards,
            Err(e) => {
                // Fired while connecting.
                tokio::spawn(close_readers(readers));
                return Err(e);
            }
        };
        let handles = readers
            .into_iter()
            .zip(guards)
            .enumerate()
            .map(|(worker_id, (reader, guard))| {
                tokio::spawn(consumer_loop(
                    worker_id,
                    reader,
                    Arc::clone(handler),
                    poll_interval,
                    self.shutdown.clone(),
                    guard,
                ))
            })
            .collect();

        tracing::info!(
            workers = self.num_workers,
            ?poll_interval,
            "Consumer workers started"
        );
        Ok(handles)
    }
}

async fn close_readers<R: Reader>(readers: Vec<R>) {
    for (worker_id, mut reader) in readers.into_iter().enumerate() {
        if let Err(e) = reader.close().await {
            tracing::warn!(worker_id, error = %e, "Failed to close reader");
        }
    }
}
