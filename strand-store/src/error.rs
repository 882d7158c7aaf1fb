//! Error types for store backends.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by an [`crate::OrderedStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_displays_reason() {
        let err = StoreError::Unavailable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn closed_displays_correctly() {
        assert_eq!(StoreError::Closed.to_string(), "store is closed");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
