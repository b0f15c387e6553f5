//! Test doubles for the transport, source and handler seams.

use crate::{Error, Handler, Message, Reader, Result, Source, WorkItem, Writer};
use core::time::Duration;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{collections::VecDeque, sync::Arc};

#[derive(Default)]
pub struct RecordingWriter {
    batches: Mutex<Vec<(String, Vec<Message>)>>,
    attempts: AtomicUsize,
    inflight: AtomicUsize,
    peak: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingWriter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<(String, Vec<Message>)> {
        self.batches.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(|(_, b)| b.len()).collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.batches
            .lock()
            .iter()
            .flat_map(|(_, b)| b.iter().cloned())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

impl Writer for RecordingWriter {
    async fn write(&self, topic: &str, batch: Vec<Message>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        let now = self.inflight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inflight.fetch_sub(1, Ordering::AcqRel);

        if self.fail {
            return Err(Error::Transport {
                context: format!("broker rejected {} messages for `{topic}`", batch.len()),
            });
        }
        self.batches.lock().push((topic.to_owned(), batch));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Reader that replays a fixed queue, then fails every read.
#[derive(Clone, Default)]
pub struct ScriptedReader {
    queue: Arc<Mutex<VecDeque<Message>>>,
    pub reads: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedReader {
    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(messages.into_iter().collect())),
            ..Self::default()
        }
    }
}

impl Reader for ScriptedReader {
    async fn read(&mut self) -> Result<Message> {
        self.reads.fetch_add(1, Ordering::AcqRel);
        self.queue.lock().pop_front().ok_or_else(|| Error::Transport {
            context: "connection refused".into(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    pub handled: Mutex<Vec<(usize, Message)>>,
    pub fail: bool,
}

impl Handler for RecordingHandler {
    async fn handle(&self, worker_id: usize, message: Message) -> Result<()> {
        if self.fail {
            return Err(Error::Serialization {
                item: "handler".into(),
                reason: "rejected".into(),
            });
        }
        self.handled.lock().push((worker_id, message));
        Ok(())
    }
}

/// Source that returns queued snapshots, then empty ones.
#[derive(Default)]
pub struct ScriptedSource {
    snapshots: Mutex<VecDeque<Result<Vec<WorkItem>>>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(snapshots: impl IntoIterator<Item = Result<Vec<WorkItem>>>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().collect()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Acquire)
    }
}

impl Source for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<WorkItem>> {
        self.fetches.fetch_add(1, Ordering::AcqRel);
        self.snapshots.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn rates(codes: &[&str]) -> Vec<WorkItem> {
    codes
        .iter()
        .enumerate()
        .map(|(i, code)| WorkItem::rate(*code, "EUR", 1.0 + i as f64, "2024-05-01"))
        .collect()
}
