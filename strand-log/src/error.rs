//! Error types for the log subsystem.

use thiserror::Error;

use strand_store::StoreError;

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors surfaced by [`crate::Log`] and [`crate::LogManager`].
#[derive(Debug, Error)]
pub enum LogError {
    /// The backing store refused or failed a write or scan. Surfaced
    /// synchronously from `add`; retrying is the caller's call.
    #[error("backend unavailable: {0}")]
    Backend(#[from] StoreError),

    /// A reader registration was incompatible with the log's current
    /// cursor mode, or supplied no readers.
    #[error("invalid read marker: {0}")]
    InvalidReadMarker(String),

    /// A stored entry could not be decoded.
    #[error("corrupt log entry: {0}")]
    Corrupt(String),

    /// The log or its manager has been closed.
    #[error("log is closed")]
    Closed,

    /// The configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A reader callback reported failure. Reader implementations use this
    /// to signal a recoverable per-message failure; the polling engine
    /// isolates it and redelivers on the next cycle.
    #[error("reader failed: {0}")]
    Reader(String),
}
