//! Work items fetched from an upstream source.
//!
//! A [`WorkItem`] is a named [`Payload`]. The payload is a closed set of
//! kinds; every place that needs to distinguish them (encoding, decoding,
//! topic routing) matches exhaustively, so adding a kind is a compile error
//! until each of those sites handles it.

use serde::{Deserialize, Serialize};

/// A single unit of work: one named payload.
///
/// Items are immutable once built. Sources produce them in a stable order,
/// which the partitioner preserves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub name: String,
    pub payload: Payload,
}

impl WorkItem {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Convenience constructor for a currency rate item.
    pub fn rate(
        code: impl Into<String>,
        base: impl Into<String>,
        value: f64,
        date: impl Into<String>,
    ) -> Self {
        Self::new(
            code,
            Payload::Rate(Rate {
                base: base.into(),
                value,
                date: date.into(),
            }),
        )
    }
}

/// The closed set of payload kinds the dispatcher knows how to ship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Payload {
    Rate(Rate),
    Proposition(Proposition),
    NowPlaying(NowPlaying),
}

impl Payload {
    /// Stable label written into the `kind` message header.
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Rate(_) => PayloadKind::Rate,
            Self::Proposition(_) => PayloadKind::Proposition,
            Self::NowPlaying(_) => PayloadKind::NowPlaying,
        }
    }
}

/// Discriminant of [`Payload`], used for routing and headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Rate,
    Proposition,
    NowPlaying,
}

impl PayloadKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rate => "rate",
            Self::Proposition => "proposition",
            Self::NowPlaying => "now-playing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "rate" => Some(Self::Rate),
            "proposition" => Some(Self::Proposition),
            "now-playing" => Some(Self::NowPlaying),
            _ => None,
        }
    }
}

/// One entry of a currency rates snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub base: String,
    #[serde(rename = "rate")]
    pub value: f64,
    pub date: String,
}

/// A suggested track discovered from an album of a playlist track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposition {
    pub album: String,
    #[serde(default)]
    pub artists: Vec<String>,
    pub playlist_index: u32,
    pub track_index: u32,
    pub playlist_id: String,
    /// The playlist track whose album produced this suggestion.
    pub source_track: String,
}

/// A recently played track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub track: String,
    /// Unix timestamp, in seconds.
    pub played_at: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub popularity: u32,
}
