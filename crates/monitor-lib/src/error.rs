//! Error types for event handling, retrieval and size lookups

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::source::EventKind;

/// A single raw event that could not be normalized. Never fatal.
#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("{kind} event has an empty payload")]
    EmptyPayload { kind: EventKind },

    #[error("{kind} payload does not match its schema: {source}")]
    Schema {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("enrichment event has no job name")]
    MissingEnrichmentKey,
}

/// Upstream retrieval failure. Fatal for the run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid event envelope at {path}:{line}: {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} fetch failed: {message}")]
    Upstream { kind: EventKind, message: String },

    #[error("cannot look back {days} days from {end}")]
    RangeOutOfBounds { end: DateTime<Utc>, days: u32 },
}

/// Failure of the external size lookup for one resource. Not fatal.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("inventory unavailable: {0}")]
    Unavailable(String),

    #[error("resource {name} not addressable: {reason}")]
    Unaddressable { name: String, reason: String },

    #[error("resource {name} not found in inventory")]
    NotFound { name: String },
}
