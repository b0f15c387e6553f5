//! Error types for the batch dispatcher.
//!
//! This module defines the central [`Error`] enum. Every per-item and
//! per-cycle failure is contained at the worker or cycle boundary and surfaces
//! only as a structured log record; [`Error::InvalidConfiguration`] is the one
//! variant that is fatal, and it is raised before any worker starts.
//!
//! ## Error Cases
//! - `InvalidConfiguration`: A count, duration, or address failed validation.
//! - `Transport`: A read, write, or close against the broker failed.
//! - `Serialization`: A payload could not be encoded or decoded.
//! - `UpstreamFetch`: The producer's data source was unavailable.
//! - `ServiceShutdown`: Work was submitted after the shutdown signal fired.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the dispatcher.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A configuration value was rejected at startup.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The transport failed to read, write, or close.
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// A work item or message could not be (de)serialized.
    #[error("Serialization of `{item}` failed: {reason}")]
    Serialization { item: String, reason: String },

    /// The upstream data source could not produce a snapshot.
    #[error("Upstream fetch failed: {reason}")]
    UpstreamFetch { reason: String },

    /// The pool is shutting down and refuses new work.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
        }
    }

    pub(crate) fn serialization(item: impl Into<String>, reason: impl ToString) -> Self {
        Self::Serialization {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}
