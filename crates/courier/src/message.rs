use bytes::Bytes;
use std::time::SystemTime;

/// Header carrying the index of the worker that produced a message.
pub const WORKER_HEADER: &str = "worker";

/// Header carrying the [`PayloadKind`](crate::PayloadKind) label.
pub const KIND_HEADER: &str = "kind";

/// A single ordered message header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Bytes,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The transport-ready unit written to and read from a topic.
///
/// Headers are ordered and may repeat a key (one `artist` header per artist,
/// for example). Messages built by [`encode`](crate::encode) always carry the
/// [`WORKER_HEADER`] first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub key: Bytes,
    pub value: Bytes,
    pub headers: Vec<Header>,
    pub timestamp: SystemTime,
}

impl Message {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            headers: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Returns the value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&Bytes> {
        self.headers.iter().find(|h| h.key == key).map(|h| &h.value)
    }

    /// Returns the values of every header named `key`, in order.
    pub fn headers_named<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Bytes> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.key == key)
            .map(|h| &h.value)
    }

    /// The producing worker index, if the header is present and well formed.
    pub fn worker_id(&self) -> Option<usize> {
        let raw = self.header(WORKER_HEADER)?;
        core::str::from_utf8(raw).ok()?.parse().ok()
    }
}
