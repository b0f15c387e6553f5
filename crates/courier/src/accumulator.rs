//! Per-destination message batching with bounded asynchronous flushes.
//!
//! A [`BatchAccumulator`] belongs to exactly one worker. Messages are appended
//! to the batch of their destination topic; once a batch holds `chunk_size`
//! messages it is handed to a background flush task and a fresh batch starts,
//! so [`append`](BatchAccumulator::append) never waits on the transport.
//!
//! Flushes are best-effort: a failed write is logged with the worker index,
//! destination and cause, and its messages are dropped. Nothing is retried.
//!
//! At most `max_inflight_flushes` writes run concurrently per accumulator.
//! Flush tasks beyond that bound are parked on a semaphore rather than
//! issuing their write, which caps the load a single worker can put on the
//! transport.

use crate::{Error, Message, Result, Writer, metrics};
use portable_atomic::{AtomicUsize, Ordering};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Batching limits for one accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Messages per batch; a batch is flushed as soon as it reaches this size.
    pub chunk_size: usize,
    /// Upper bound on concurrently running transport writes.
    pub max_inflight_flushes: usize,
}

impl BatchConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either limit is zero.
    pub fn new(chunk_size: usize, max_inflight_flushes: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid_configuration(
                "chunk size must be greater than 0",
            ));
        }
        if max_inflight_flushes == 0 {
            return Err(Error::invalid_configuration(
                "max in-flight flushes must be greater than 0",
            ));
        }
        Ok(Self {
            chunk_size,
            max_inflight_flushes,
        })
    }
}

/// Flush counters shared between an accumulator and its flush tasks.
#[derive(Debug, Default)]
pub struct FlushStats {
    flushes: AtomicUsize,
    delivered: AtomicUsize,
    dropped: AtomicUsize,
    inflight: AtomicUsize,
    peak_inflight: AtomicUsize,
}

impl FlushStats {
    /// Batches handed to the transport (or waiting for a permit).
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    /// Messages in batches the transport accepted.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Acquire)
    }

    /// Messages in batches the transport rejected.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Acquire)
    }

    /// Highest number of writes observed in flight at once.
    pub fn peak_inflight(&self) -> usize {
        self.peak_inflight.load(Ordering::Acquire)
    }
}

/// Buffers messages per destination and flushes full batches in the
/// background.
pub struct BatchAccumulator<W> {
    worker_id: usize,
    config: BatchConfig,
    writer: Arc<W>,
    slots: HashMap<String, Vec<Message>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    stats: Arc<FlushStats>,
}

impl<W: Writer> BatchAccumulator<W> {
    pub fn new(worker_id: usize, writer: Arc<W>, config: BatchConfig) -> Self {
        Self {
            worker_id,
            config,
            writer,
            slots: HashMap::new(),
            permits: Arc::new(Semaphore::new(config.max_inflight_flushes)),
            tracker: TaskTracker::new(),
            stats: Arc::new(FlushStats::default()),
        }
    }

    /// Appends `message` to the batch for `destination`, flushing the batch in
    /// the background once it reaches the chunk size.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn append(&mut self, destination: &str, message: Message) {
        let chunk_size = self.config.chunk_size;
        let slot = self
            .slots
            .entry(destination.to_owned())
            .or_insert_with(|| Vec::with_capacity(chunk_size));

        slot.push(message);
        if slot.len() >= chunk_size {
            let batch = core::mem::replace(slot, Vec::with_capacity(chunk_size));
            self.dispatch(destination.to_owned(), batch);
        }
    }

    /// Flushes the partially filled batch for `destination`, if any.
    pub fn flush(&mut self, destination: &str) {
        if let Some(slot) = self.slots.get_mut(destination) {
            if !slot.is_empty() {
                let batch = core::mem::take(slot);
                self.dispatch(destination.to_owned(), batch);
            }
        }
    }

    /// Flushes every non-empty batch.
    pub fn flush_all(&mut self) {
        let pending: Vec<(String, Vec<Message>)> = self
            .slots
            .iter_mut()
            .filter(|(_, slot)| !slot.is_empty())
            .map(|(destination, slot)| (destination.clone(), core::mem::take(slot)))
            .collect();

        for (destination, batch) in pending {
            self.dispatch(destination, batch);
        }
    }

    /// Number of buffered, not yet flushed messages for `destination`.
    pub fn pending(&self, destination: &str) -> usize {
        self.slots.get(destination).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    /// Waits for every flush dispatched so far to finish.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Flushes all partial batches and waits for every in-flight flush.
    ///
    /// Returns the final counters.
    pub async fn drain(mut self) -> Arc<FlushStats> {
        self.flush_all();
        self.tracker.close();
        self.tracker.wait().await;
        self.stats
    }

    fn dispatch(&self, destination: String, batch: Vec<Message>) {
        let worker_id = self.worker_id;
        let writer = Arc::clone(&self.writer);
        let permits = Arc::clone(&self.permits);
        let stats = Arc::clone(&self.stats);
        stats.flushes.fetch_add(1, Ordering::AcqRel);

        self.tracker.spawn(async move {
            // The semaphore is never closed, so acquiring only fails if that
            // invariant is broken.
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::error!(worker_id, %destination, "Flush semaphore closed");
                return;
            };

            let len = batch.len();
            let inflight = stats.inflight.fetch_add(1, Ordering::AcqRel) + 1;
            stats.peak_inflight.fetch_max(inflight, Ordering::AcqRel);

            let result = writer.write(&destination, batch).await;
            stats.inflight.fetch_sub(1, Ordering::AcqRel);

            match result {
                Ok(()) => {
                    stats.delivered.fetch_add(len, Ordering::AcqRel);
                    metrics::increment_messages_written(len as u64);
                    tracing::debug!(worker_id, %destination, len, "Flushed batch");
                }
                Err(e) => {
                    stats.dropped.fetch_add(len, Ordering::AcqRel);
                    metrics::increment_messages_dropped(len as u64);
                    tracing::error!(
                        worker_id,
                        %destination,
                        len,
                        error = %e,
                        "Failed to flush batch, dropping messages"
                    );
                }
            }
        });
    }
}
