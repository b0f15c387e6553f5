use crate::{
    BatchAccumulator, BatchConfig, Handler, Partition, Reader, ShutdownCoordinator, Topics,
    WorkerGuard, Writer, encode, metrics,
};
use core::time::Duration;
use std::sync::Arc;

/// Lifecycle of a single worker.
///
/// Consumers cycle `Waiting -> Active -> Waiting` until shutdown moves them to
/// `Draining` and then `Done`. Producers go `Idle -> Active -> Draining ->
/// Done` once per partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Waiting,
    Active,
    Draining,
    Done,
}

fn enter(worker_id: usize, state: WorkerState) {
    tracing::trace!(worker_id, ?state, "Worker state changed");
}

/// Outcome of one producer worker's partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub worker_id: usize,
    /// Items encoded and handed to the accumulator.
    pub encoded: usize,
    /// Items skipped because they could not be encoded.
    pub skipped: usize,
    /// Messages the transport accepted.
    pub delivered: usize,
    /// Messages lost to failed flushes.
    pub dropped: usize,
}

/// Consumer worker loop.
///
/// Each iteration races the shutdown signal against the poll delay (shutdown
/// wins ties), then issues one blocking read. A successful read goes to
/// `handler`; a failed read or a handler error is logged and the loop goes
/// back to waiting. The loop only ends when shutdown fires, after which the
/// reader is closed.
///
/// A read in progress is never interrupted, so shutdown latency is bounded by
/// the reader's own timeout plus one poll interval.
pub async fn consumer_loop<R, H>(
    worker_id: usize,
    mut reader: R,
    handler: Arc<H>,
    poll_interval: Duration,
    shutdown: ShutdownCoordinator,
    guard: WorkerGuard,
) where
    R: Reader,
    H: Handler,
{
    tracing::debug!(worker_id, "Consumer worker started");

    loop {
        enter(worker_id, WorkerState::Waiting);
        tokio::select! {
            biased;
            () = shutdown.fired() => break,
            () = tokio::time::sleep(poll_interval) => {}
        }

        enter(worker_id, WorkerState::Active);
        match reader.read().await {
            Ok(message) => {
                if let Err(e) = handler.handle(worker_id, message).await {
                    tracing::error!(worker_id, error = %e, "Failed to handle message");
                } else {
                    metrics::increment_messages_handled();
                }
            }
            Err(e) => {
                metrics::increment_read_errors();
                tracing::error!(worker_id, error = %e, "Failed to read message");
            }
        }
    }

    enter(worker_id, WorkerState::Draining);
    if let Err(e) = reader.close().await {
        tracing::warn!(worker_id, error = %e, "Failed to close reader");
    }

    enter(worker_id, WorkerState::Done);
    tracing::debug!(worker_id, "Consumer worker stopped");
    drop(guard);
}

/// Producer worker body for one partition.
///
/// Items are encoded and appended strictly in partition order. An item that
/// cannot be encoded is logged and skipped; the rest of the partition still
/// goes out. Before finishing, every partially filled batch is flushed and
/// the worker waits for its in-flight flushes, so nothing it accepted is left
/// behind in a buffer.
pub async fn produce_partition<W: Writer>(
    worker_id: usize,
    partition: Partition,
    writer: Arc<W>,
    topics: Arc<Topics>,
    batch: BatchConfig,
    guard: WorkerGuard,
) -> PartitionReport {
    enter(worker_id, WorkerState::Idle);
    let mut report = PartitionReport {
        worker_id,
        ..PartitionReport::default()
    };
    let mut accumulator = BatchAccumulator::new(worker_id, writer, batch);

    enter(worker_id, WorkerState::Active);
    tracing::debug!(worker_id, items = partition.len(), "Producing partition");

    for item in &partition {
        match encode(item, worker_id) {
            Ok(message) => {
                accumulator.append(topics.route(item.payload.kind()), message);
                report.encoded += 1;
            }
            Err(e) => {
                report.skipped += 1;
                metrics::increment_items_skipped();
                tracing::error!(
                    worker_id,
                    item = %item.name,
                    error = %e,
                    "Failed to encode item, skipping"
                );
            }
        }
    }

    enter(worker_id, WorkerState::Draining);
    let stats = accumulator.drain().await;
    report.delivered = stats.delivered();
    report.dropped = stats.dropped();

    enter(worker_id, WorkerState::Done);
    tracing::debug!(
        worker_id,
        encoded = report.encoded,
        skipped = report.skipped,
        delivered = report.delivered,
        dropped = report.dropped,
        "Partition done"
    );
    drop(guard);
    report
}
