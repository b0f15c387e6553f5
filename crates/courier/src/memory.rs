//! An in-process partitioned log implementing [`Writer`] and [`Reader`].
//!
//! Each topic is a fixed number of append-only partitions. Writes spread
//! messages round-robin across partitions. A partition keeps at most
//! `retention` messages; older ones are discarded and a group whose offset
//! falls behind them resumes at the oldest retained message. Readers join a consumer group and
//! share its committed offsets, so within one group every message is handed
//! to exactly one reader; the offset is committed as the message is handed
//! out (at-most-once).
//!
//! A read with nothing to deliver parks on a [`Notify`] until a write lands
//! or the reader's `max_wait` elapses, in which case it fails with
//! [`Error::Transport`].

use crate::{Error, Message, Reader, Result, Writer};
use core::time::Duration;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::{sync::Notify, time::Instant};

/// Address scheme accepted by [`MemoryBroker::connect`].
pub const MEMORY_SCHEME: &str = "memory://";

/// Messages kept per partition unless [`MemoryBroker::with_retention`] says
/// otherwise.
pub const DEFAULT_RETENTION: usize = 10_000;

/// Retained tail of one partition. `base` is the offset of the front message.
#[derive(Clone, Default)]
struct PartitionLog {
    base: usize,
    messages: VecDeque<Message>,
}

impl PartitionLog {
    fn push(&mut self, message: Message, retention: usize) {
        self.messages.push_back(message);
        while self.messages.len() > retention {
            self.messages.pop_front();
            self.base += 1;
        }
    }

    fn get(&self, offset: usize) -> Option<&Message> {
        self.messages.get(offset - self.base)
    }
}

#[derive(Default)]
struct TopicLog {
    partitions: Vec<PartitionLog>,
    next_partition: usize,
    /// Committed offset per partition, keyed by consumer group.
    groups: HashMap<String, Vec<usize>>,
}

impl TopicLog {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: vec![PartitionLog::default(); partitions],
            ..Self::default()
        }
    }

    fn append(&mut self, message: Message, retention: usize) {
        let idx = self.next_partition;
        self.next_partition = (idx + 1) % self.partitions.len();
        self.partitions[idx].push(message, retention);
    }

    fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.messages.len()).sum()
    }

    /// Hands out the next uncommitted message for `group`, scanning partitions
    /// from `start` so readers of one group do not all favour partition 0.
    fn next_for(&mut self, group: &str, start: usize) -> Option<Message> {
        let count = self.partitions.len();
        let offsets = self
            .groups
            .entry(group.to_owned())
            .or_insert_with(|| vec![0; count]);

        for step in 0..count {
            let idx = (start + step) % count;
            let partition = &self.partitions[idx];
            let offset = offsets[idx].max(partition.base);
            if let Some(message) = partition.get(offset) {
                offsets[idx] = offset + 1;
                return Some(message.clone());
            }
        }
        None
    }
}

struct BrokerInner {
    name: String,
    partitions: usize,
    retention: AtomicUsize,
    topics: Mutex<HashMap<String, TopicLog>>,
    notify: Notify,
}

/// Handle to an in-process broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl core::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("name", &self.inner.name)
            .field("partitions", &self.inner.partitions)
            .field("retention", &self.retention())
            .finish_non_exhaustive()
    }
}

impl MemoryBroker {
    /// Creates a broker whose topics each have `partitions` partitions, each
    /// keeping up to [`DEFAULT_RETENTION`] messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `partitions` is zero.
    pub fn new(name: impl Into<String>, partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(Error::invalid_configuration(
                "partitions per topic must be greater than 0",
            ));
        }
        Ok(Self {
            inner: Arc::new(BrokerInner {
                name: name.into(),
                partitions,
                retention: AtomicUsize::new(DEFAULT_RETENTION),
                topics: Mutex::new(HashMap::new()),
                notify: Notify::new(),
            }),
        })
    }

    /// Resolves a list of broker addresses to an in-process broker.
    ///
    /// Every address must use the `memory://<name>` scheme and name the same
    /// broker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the list is empty, an address
    /// uses another scheme, or the addresses disagree on the broker name.
    pub fn connect<S: AsRef<str>>(addresses: &[S], partitions: usize) -> Result<Self> {
        let mut name: Option<&str> = None;
        for address in addresses {
            let address = address.as_ref();
            let Some(rest) = address.strip_prefix(MEMORY_SCHEME) else {
                return Err(Error::invalid_configuration(format!(
                    "unsupported broker address `{address}` (expected {MEMORY_SCHEME}<name>)"
                )));
            };
            if rest.is_empty() {
                return Err(Error::invalid_configuration(format!(
                    "broker address `{address}` is missing a name"
                )));
            }
            match name {
                None => name = Some(rest),
                Some(existing) if existing == rest => {}
                Some(existing) => {
                    return Err(Error::invalid_configuration(format!(
                        "broker addresses name different brokers (`{existing}` and `{rest}`)"
                    )));
                }
            }
        }

        let name = name.ok_or_else(|| Error::invalid_configuration("no broker addresses"))?;
        Self::new(name, partitions)
    }

    /// Caps every partition at `retention` messages. Applies to every clone
    /// of this broker and takes effect on the next write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `retention` is zero.
    pub fn with_retention(self, retention: usize) -> Result<Self> {
        if retention == 0 {
            return Err(Error::invalid_configuration(
                "retention must be greater than 0",
            ));
        }
        self.inner.retention.store(retention, Ordering::Release);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn retention(&self) -> usize {
        self.inner.retention.load(Ordering::Acquire)
    }

    /// Returns a writer sharing this broker.
    pub fn writer(&self) -> MemoryWriter {
        MemoryWriter {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns a reader for `topic` in consumer group `group`.
    ///
    /// `start` selects the first partition the reader scans; passing the
    /// worker index spreads readers of one group across partitions.
    pub fn reader(
        &self,
        topic: impl Into<String>,
        group: impl Into<String>,
        start: usize,
        max_wait: Duration,
    ) -> MemoryReader {
        MemoryReader {
            broker: self.clone(),
            topic: topic.into(),
            group: group.into(),
            start: start % self.inner.partitions,
            max_wait,
            closed: false,
        }
    }

    /// Number of messages `topic` currently retains.
    pub fn len(&self, topic: &str) -> usize {
        self.inner.topics.lock().get(topic).map_or(0, TopicLog::len)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Copies every retained message of `topic`, partition by partition.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map(|log| {
                log.partitions
                    .iter()
                    .flat_map(|p| p.messages.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn append(&self, topic: &str, batch: Vec<Message>) {
        let retention = self.retention();
        {
            let mut topics = self.inner.topics.lock();
            let log = topics
                .entry(topic.to_owned())
                .or_insert_with(|| TopicLog::new(self.inner.partitions));
            for message in batch {
                log.append(message, retention);
            }
        }
        self.inner.notify.notify_waiters();
    }

    fn next_for(&self, topic: &str, group: &str, start: usize) -> Option<Message> {
        let mut topics = self.inner.topics.lock();
        topics
            .entry(topic.to_owned())
            .or_insert_with(|| TopicLog::new(self.inner.partitions))
            .next_for(group, start)
    }
}

/// Shared writer over a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryWriter {
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl Writer for MemoryWriter {
    async fn write(&self, topic: &str, batch: Vec<Message>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::transport(format!(
                "writer for broker `{}` is closed",
                self.broker.name()
            )));
        }
        self.broker.append(topic, batch);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Consumer-group reader over a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryReader {
    broker: MemoryBroker,
    topic: String,
    group: String,
    start: usize,
    max_wait: Duration,
    closed: bool,
}

impl Reader for MemoryReader {
    async fn read(&mut self) -> Result<Message> {
        if self.closed {
            return Err(Error::transport(format!(
                "reader for topic `{}` is closed",
                self.topic
            )));
        }

        let deadline = Instant::now() + self.max_wait;
        loop {
            // Register for wakeups before checking, so a write landing between
            // the check and the await is not missed.
            let notified = self.broker.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.broker.next_for(&self.topic, &self.group, self.start) {
                return Ok(message);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::transport(format!(
                    "no message on topic `{}` within {:?}",
                    self.topic, self.max_wait
                )));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(key: &'static str) -> Message {
        Message::new(key, "v")
    }

    #[test]
    fn connect_accepts_memory_addresses() {
        let broker = MemoryBroker::connect(&["memory://local", "memory://local"], 3).unwrap();
        assert_eq!(broker.name(), "local");
    }

    #[test]
    fn connect_rejects_bad_addresses() {
        let cases: [&[&str]; 4] = [
            &[],
            &["localhost:9092"],
            &["memory://"],
            &["memory://a", "memory://b"],
        ];
        for addresses in cases {
            let err = MemoryBroker::connect(addresses, 1).unwrap_err();
            assert!(matches!(err, Error::InvalidConfiguration { .. }), "{addresses:?}");
        }
    }

    #[test]
    fn zero_partitions_is_invalid() {
        assert!(MemoryBroker::new("b", 0).is_err());
    }

    #[test]
    fn zero_retention_is_invalid() {
        let broker = MemoryBroker::new("b", 1).unwrap();
        assert!(broker.with_retention(0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retention_bounds_every_partition() {
        let broker = MemoryBroker::new("b", 2).unwrap().with_retention(5).unwrap();
        let writer = broker.writer();
        let mut consumed = broker.reader("t", "g", 0, Duration::from_millis(10));

        for round in 0..100 {
            let batch = (0..10)
                .map(|i| Message::new(format!("{round}-{i}"), "v"))
                .collect();
            writer.write("t", batch).await.unwrap();
            for _ in 0..10 {
                consumed.read().await.unwrap();
            }
        }
        assert_eq!(broker.len("t"), 10);

        // A new group only sees what is still retained.
        let mut late = broker.reader("t", "late", 0, Duration::from_millis(10));
        let mut keys = Vec::new();
        while let Ok(message) = late.read().await {
            keys.push(message.key);
        }
        assert_eq!(keys.len(), 10);
        assert!(keys.iter().all(|key| key.starts_with(b"99-")));
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_group_resumes_at_the_oldest_retained_message() {
        let broker = MemoryBroker::new("b", 1).unwrap().with_retention(2).unwrap();
        let writer = broker.writer();
        let mut reader = broker.reader("t", "g", 0, Duration::from_millis(10));

        writer.write("t", vec![msg("a")]).await.unwrap();
        assert_eq!(reader.read().await.unwrap().key, "a");

        writer
            .write("t", vec![msg("b"), msg("c"), msg("d")])
            .await
            .unwrap();
        assert_eq!(reader.read().await.unwrap().key, "c");
        assert_eq!(reader.read().await.unwrap().key, "d");
        assert!(reader.read().await.is_err());
    }

    #[tokio::test]
    async fn writes_spread_round_robin_across_partitions() {
        let broker = MemoryBroker::new("b", 3).unwrap();
        let writer = broker.writer();
        writer
            .write("t", vec![msg("a"), msg("b"), msg("c"), msg("d")])
            .await
            .unwrap();

        let topics = broker.inner.topics.lock();
        let sizes: Vec<_> = topics["t"]
            .partitions
            .iter()
            .map(|p| p.messages.len())
            .collect();
        assert_eq!(sizes, [2, 1, 1]);
    }

    #[tokio::test]
    async fn group_members_share_offsets() {
        let broker = MemoryBroker::new("b", 2).unwrap();
        broker
            .writer()
            .write("t", vec![msg("a"), msg("b"), msg("c")])
            .await
            .unwrap();

        let wait = Duration::from_millis(10);
        let mut r0 = broker.reader("t", "g", 0, wait);
        let mut r1 = broker.reader("t", "g", 1, wait);
        let mut other = broker.reader("t", "other", 0, wait);

        let mut seen = vec![
            r0.read().await.unwrap().key,
            r1.read().await.unwrap().key,
            r0.read().await.unwrap().key,
        ];
        seen.sort();
        assert_eq!(seen, ["a", "b", "c"]);
        assert!(r1.read().await.is_err());

        // A different group starts from the beginning.
        assert!(other.read().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn read_times_out_when_empty() {
        let broker = MemoryBroker::new("b", 1).unwrap();
        let mut reader = broker.reader("t", "g", 0, Duration::from_secs(5));
        let err = reader.read().await.unwrap_err();
        assert!(matches!(err, Error::Transport { ref context } if context.contains("no message")));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_read_wakes_on_write() {
        let broker = MemoryBroker::new("b", 1).unwrap();
        let mut reader = broker.reader("t", "g", 0, Duration::from_secs(60));

        let writer = broker.writer();
        let write = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.write("t", vec![msg("late")]).await.unwrap();
        };

        let (read, ()) = tokio::join!(reader.read(), write);
        assert_eq!(read.unwrap().key, "late");
    }

    #[tokio::test]
    async fn closed_handles_fail() {
        let broker = MemoryBroker::new("b", 1).unwrap();
        let writer = broker.writer();
        writer.close().await.unwrap();
        assert!(writer.write("t", vec![msg("a")]).await.is_err());

        let mut reader = broker.reader("t", "g", 0, Duration::from_millis(1));
        reader.close().await.unwrap();
        assert!(reader.read().await.is_err());
    }

    #[tokio::test]
    async fn len_and_messages_report_topic_contents() {
        let broker = MemoryBroker::new("b", 2).unwrap();
        assert!(broker.is_empty("t"));
        broker
            .writer()
            .write("t", vec![msg("a"), msg("b")])
            .await
            .unwrap();
        assert_eq!(broker.len("t"), 2);
        assert_eq!(broker.messages("t").len(), 2);
    }
}
