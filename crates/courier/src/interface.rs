use crate::{Message, Result, WorkItem};

/// Upstream data collaborator for producer mode.
///
/// Called once per dispatch cycle. The returned order is the order the
/// partitioner sees, so sources should return a stable order for the same
/// snapshot.
pub trait Source: Send + Sync + 'static {
    /// Fetches the work for one cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamFetch`](crate::Error::UpstreamFetch) if the
    /// source is unavailable; the whole cycle is skipped and the next tick
    /// retries.
    fn fetch(&self) -> impl Future<Output = Result<Vec<WorkItem>>> + Send;
}

/// Pluggable consumer-side function, invoked once per successfully read
/// message.
pub trait Handler: Send + Sync + 'static {
    /// Processes one message read by worker `worker_id`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the worker and otherwise ignored.
    fn handle(&self, worker_id: usize, message: Message)
    -> impl Future<Output = Result<()>> + Send;
}
