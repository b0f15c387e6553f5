//! The broker client abstraction.
//!
//! The wire protocol is opaque to the dispatcher: all it needs is a shared
//! [`Writer`] that ships a batch to a topic and a per-worker [`Reader`] that
//! pulls one message at a time. Offsets, acknowledgement and partition
//! placement are the transport's business.

use crate::{Message, Result};

/// Writes batches of messages to topics.
///
/// A single writer is shared by every producer worker and every in-flight
/// flush, so implementations must be safe for concurrent use.
pub trait Writer: Send + Sync + 'static {
    /// Writes `batch` to `topic` as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the batch could
    /// not be written. The caller does not retry.
    fn write(&self, topic: &str, batch: Vec<Message>) -> impl Future<Output = Result<()>> + Send;

    /// Releases the writer. Further writes fail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the underlying
    /// connection could not be closed cleanly.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Reads messages from a topic on behalf of a single consumer worker.
///
/// Each consumer worker owns its reader exclusively. A read may block for as
/// long as the transport's own timeout allows; the dispatcher never interrupts
/// it.
pub trait Reader: Send + 'static {
    /// Blocks until a message is available or the transport gives up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) on timeout, on a
    /// closed reader, or on a broker failure.
    fn read(&mut self) -> impl Future<Output = Result<Message>> + Send;

    /// Releases the reader. Further reads fail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the underlying
    /// connection could not be closed cleanly.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
