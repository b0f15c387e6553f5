//! Conversion between [`WorkItem`]s and wire [`Message`]s.
//!
//! Layout per payload kind:
//!
//! | kind          | key  | value                      | extra headers                                   |
//! |---------------|------|----------------------------|-------------------------------------------------|
//! | `rate`        | name | JSON `{base, rate, date}`  | -                                               |
//! | `proposition` | name | album                      | `artist`*, `playlist-index`, `track-index`, `playlist-id`, `source-track` |
//! | `now-playing` | name | track                      | `played-at`, `duration`, `artist`* (JSON)       |
//!
//! Every message starts with the [`WORKER_HEADER`] followed by the
//! [`KIND_HEADER`].

use crate::{
    Artist, Error, KIND_HEADER, Message, NowPlaying, Payload, PayloadKind, Proposition, Rate,
    Result, WORKER_HEADER, WorkItem,
};
use bytes::Bytes;
use core::str::FromStr;

const ARTIST: &str = "artist";
const PLAYLIST_INDEX: &str = "playlist-index";
const TRACK_INDEX: &str = "track-index";
const PLAYLIST_ID: &str = "playlist-id";
const SOURCE_TRACK: &str = "source-track";
const PLAYED_AT: &str = "played-at";
const DURATION: &str = "duration";

/// Destination topic for each payload kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    pub rates: String,
    pub propositions: String,
    pub now_playing: String,
}

impl Topics {
    /// Routes every payload kind to the same topic.
    pub fn uniform(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            rates: topic.clone(),
            propositions: topic.clone(),
            now_playing: topic,
        }
    }

    pub fn route(&self, kind: PayloadKind) -> &str {
        match kind {
            PayloadKind::Rate => &self.rates,
            PayloadKind::Proposition => &self.propositions,
            PayloadKind::NowPlaying => &self.now_playing,
        }
    }
}

/// Encodes `item` into a message stamped with the producing worker's index.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the payload cannot be represented, such
/// as a non-finite rate.
pub fn encode(item: &WorkItem, worker_id: usize) -> Result<Message> {
    let kind = item.payload.kind();
    let header = |value: Bytes| {
        Message::new(Bytes::from(item.name.clone()), value)
            .with_header(WORKER_HEADER, worker_id.to_string())
            .with_header(KIND_HEADER, kind.as_str())
    };

    let message = match &item.payload {
        Payload::Rate(rate) => {
            if !rate.value.is_finite() {
                return Err(Error::serialization(
                    &item.name,
                    format!("rate {} is not a finite number", rate.value),
                ));
            }
            let value =
                serde_json::to_vec(rate).map_err(|e| Error::serialization(&item.name, e))?;
            header(value.into())
        }
        Payload::Proposition(p) => {
            let mut m = header(Bytes::from(p.album.clone()));
            for artist in &p.artists {
                m = m.with_header(ARTIST, artist.clone());
            }
            m.with_header(PLAYLIST_INDEX, p.playlist_index.to_string())
                .with_header(TRACK_INDEX, p.track_index.to_string())
                .with_header(PLAYLIST_ID, p.playlist_id.clone())
                .with_header(SOURCE_TRACK, p.source_track.clone())
        }
        Payload::NowPlaying(n) => {
            let mut m = header(Bytes::from(n.track.clone()))
                .with_header(PLAYED_AT, n.played_at.to_string())
                .with_header(DURATION, n.duration_ms.to_string());
            for artist in &n.artists {
                let raw =
                    serde_json::to_vec(artist).map_err(|e| Error::serialization(&item.name, e))?;
                m = m.with_header(ARTIST, raw);
            }
            m
        }
    };

    Ok(message)
}

/// Rebuilds the [`WorkItem`] a message was encoded from.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the key is not UTF-8, the `kind` header
/// is missing or unknown, or any kind-specific field fails to parse.
pub fn decode(message: &Message) -> Result<WorkItem> {
    let name = core::str::from_utf8(&message.key)
        .map_err(|e| Error::serialization("<non-utf8 key>", e))?
        .to_owned();

    let kind = message
        .header(KIND_HEADER)
        .and_then(|raw| core::str::from_utf8(raw).ok())
        .and_then(PayloadKind::parse)
        .ok_or_else(|| Error::serialization(&name, "missing or unknown kind header"))?;

    let payload = match kind {
        PayloadKind::Rate => {
            let rate: Rate = serde_json::from_slice(&message.value)
                .map_err(|e| Error::serialization(&name, e))?;
            Payload::Rate(rate)
        }
        PayloadKind::Proposition => Payload::Proposition(Proposition {
            album: text(&name, &message.value)?,
            artists: message
                .headers_named(ARTIST)
                .map(|raw| text(&name, raw))
                .collect::<Result<_>>()?,
            playlist_index: number(&name, message, PLAYLIST_INDEX)?,
            track_index: number(&name, message, TRACK_INDEX)?,
            playlist_id: required(&name, message, PLAYLIST_ID)?,
            source_track: required(&name, message, SOURCE_TRACK)?,
        }),
        PayloadKind::NowPlaying => Payload::NowPlaying(NowPlaying {
            track: text(&name, &message.value)?,
            played_at: number(&name, message, PLAYED_AT)?,
            duration_ms: number(&name, message, DURATION)?,
            artists: message
                .headers_named(ARTIST)
                .map(|raw| {
                    serde_json::from_slice::<Artist>(raw).map_err(|e| Error::serialization(&name, e))
                })
                .collect::<Result<_>>()?,
        }),
    };

    Ok(WorkItem { name, payload })
}

fn text(item: &str, raw: &[u8]) -> Result<String> {
    core::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| Error::serialization(item, e))
}

fn required(item: &str, message: &Message, header: &str) -> Result<String> {
    let raw = message
        .header(header)
        .ok_or_else(|| Error::serialization(item, format!("missing `{header}` header")))?;
    text(item, raw)
}

fn number<T>(item: &str, message: &Message, header: &str) -> Result<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    required(item, message, header)?
        .parse()
        .map_err(|e: T::Err| Error::serialization(item, format!("`{header}`: {e}")))
}
