use crate::{
    BatchConfig, Cycle, PartitionReport, Result, Source, Topics, WorkerPool, Writer, partition,
};
use std::sync::Arc;

/// Totals for one producer dispatch cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub items: usize,
    pub encoded: usize,
    pub skipped: usize,
    pub delivered: usize,
    pub dropped: usize,
}

impl CycleSummary {
    fn add(mut self, report: &PartitionReport) -> Self {
        self.encoded += report.encoded;
        self.skipped += report.skipped;
        self.delivered += report.delivered;
        self.dropped += report.dropped;
        self
    }
}

/// Producer-mode dispatch cycle: fetch a snapshot, split it round-robin over
/// the pool, and ship every partition through the shared writer.
pub struct ProduceCycle<S, W> {
    source: S,
    pool: WorkerPool,
    writer: Arc<W>,
    topics: Arc<Topics>,
    batch: BatchConfig,
}

impl<S: Source, W: Writer> ProduceCycle<S, W> {
    pub fn new(
        source: S,
        pool: WorkerPool,
        writer: Arc<W>,
        topics: Topics,
        batch: BatchConfig,
    ) -> Self {
        Self {
            source,
            pool,
            writer,
            topics: Arc::new(topics),
            batch,
        }
    }

    /// Runs one cycle and returns its totals.
    ///
    /// # Errors
    ///
    /// - [`Error::UpstreamFetch`](crate::Error::UpstreamFetch) if the source
    ///   fails; nothing is dispatched.
    /// - [`Error::ServiceShutdown`](crate::Error::ServiceShutdown) if shutdown
    ///   fired before the workers were spawned.
    pub async fn run_once(&self) -> Result<CycleSummary> {
        let items = self.source.fetch().await?;
        let total = items.len();
        let partitions = partition(items, self.pool.num_workers())?;

        let reports = self
            .pool
            .run_partitions(partitions, &self.writer, &self.topics, self.batch)
            .await?;

        let summary = reports.iter().fold(
            CycleSummary {
                items: total,
                ..CycleSummary::default()
            },
            CycleSummary::add,
        );

        tracing::info!(
            items = summary.items,
            delivered = summary.delivered,
            dropped = summary.dropped,
            skipped = summary.skipped,
            "Dispatch cycle complete"
        );
        Ok(summary)
    }
}

impl<S: Source, W: Writer> Cycle for ProduceCycle<S, W> {
    async fn run(&mut self) -> Result<()> {
        self.run_once().await.map(|_| ())
    }
}
