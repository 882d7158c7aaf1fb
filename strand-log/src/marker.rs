//! Read markers: where a newly registered reader's cursor starts.

use chrono::{DateTime, Utc};

/// Start position for a reader registration.
///
/// The two identifier-scoped variants tie the registration to a persisted
/// checkpoint: if a checkpoint exists for the identifier the reader resumes
/// from it, otherwise the variant's fallback applies and the checkpoint is
/// created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadMarker {
    /// Start strictly after the current tail; pre-existing messages are
    /// never delivered.
    Now,
    /// Start at the first message with a timestamp at or after the instant.
    Time(DateTime<Utc>),
    /// Resume from the identifier's checkpoint, falling back to "now".
    IdentifierOrNow { id: String },
    /// Resume from the identifier's checkpoint, falling back to the instant.
    IdentifierOrTime { id: String, time: DateTime<Utc> },
}

impl ReadMarker {
    /// Start after the current tail of the log.
    #[must_use]
    pub fn from_now() -> Self {
        Self::Now
    }

    /// Start at the first message written at or after `time`.
    #[must_use]
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self::Time(time)
    }

    /// Resume from the checkpoint for `id`, or from "now" if none exists.
    #[must_use]
    pub fn from_identifier_or_now(id: impl Into<String>) -> Self {
        Self::IdentifierOrNow { id: id.into() }
    }

    /// Resume from the checkpoint for `id`, or from `time` if none exists.
    #[must_use]
    pub fn from_identifier_or_time(id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self::IdentifierOrTime {
            id: id.into(),
            time,
        }
    }

    /// The checkpoint identifier, for the identifier-scoped variants.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Now | Self::Time(_) => None,
            Self::IdentifierOrNow { id } | Self::IdentifierOrTime { id, .. } => Some(id),
        }
    }

    /// Resolve the marker's start instant, given the registration time.
    /// For identifier variants this is the fallback used when no checkpoint
    /// exists yet.
    pub fn start_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Now | Self::IdentifierOrNow { .. } => now,
            Self::Time(time) | Self::IdentifierOrTime { time, .. } => *time,
        }
    }
}
