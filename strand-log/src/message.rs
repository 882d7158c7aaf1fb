//! The immutable message envelope delivered to readers.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A message stored in a log: sender identity, write timestamp, opaque
/// payload. Constructed by [`crate::Log::add`] on the write side and by the
/// polling engine's decoder on the read side; never mutated afterwards.
///
/// Cloning is cheap: the payload is a reference-counted [`Bytes`], so one
/// decode can fan out to many readers.
#[derive(Debug, Clone)]
pub struct Message {
    sender: String,
    timestamp: DateTime<Utc>,
    payload: Bytes,
}

impl Message {
    pub(crate) fn new(sender: String, timestamp: DateTime<Utc>, payload: Bytes) -> Self {
        Self {
            sender,
            timestamp,
            payload,
        }
    }

    /// Identity of the instance that wrote this message.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Write timestamp, assigned by the log at `add` time. Always at or
    /// before the reader's current time when delivered.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The opaque payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}
