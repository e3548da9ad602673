//! Error types for `chronos-core`.
//!
//! Mirrors the single unified `thiserror` error enum pattern used across the
//! crate's components, with stable `CHRONOS-XXX` codes for easy debugging.

use thiserror::Error;

/// Result type alias for `chronos-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `chronos-core` operations.
///
/// `NotFound` is used internally for control flow inside the codec and
/// controller paths; the wire boundary represents absence positionally
/// (null bulk / `-2` TTL / `0` DEL count) rather than as a protocol error.
#[derive(Error, Debug)]
pub enum Error {
    /// Key exceeds the maximum length (CHRONOS-001).
    #[error("[CHRONOS-001] key exceeds maximum length of 1024 bytes (got {0})")]
    KeyTooLong(usize),

    /// Value exceeds the maximum size (CHRONOS-002).
    #[error("[CHRONOS-002] value exceeds maximum size of 10485760 bytes (got {0})")]
    ValueTooLarge(usize),

    /// Key not found (CHRONOS-003).
    #[error("[CHRONOS-003] key '{0}' not found")]
    NotFound(String),

    /// Malformed protocol frame (CHRONOS-004).
    #[error("[CHRONOS-004] protocol error: {0}")]
    Protocol(String),

    /// Configuration error (CHRONOS-005).
    #[error("[CHRONOS-005] configuration error: {0}")]
    Config(String),

    /// Snapshot I/O error (CHRONOS-006).
    #[error("[CHRONOS-006] snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// Snapshot corruption (CHRONOS-007).
    #[error("[CHRONOS-007] snapshot corrupted: {0}")]
    SnapshotCorrupted(String),

    /// Internal error (CHRONOS-008).
    ///
    /// Indicates an unexpected internal error. Please report if encountered.
    #[error("[CHRONOS-008] internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "CHRONOS-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::KeyTooLong(_) => "CHRONOS-001",
            Self::ValueTooLarge(_) => "CHRONOS-002",
            Self::NotFound(_) => "CHRONOS-003",
            Self::Protocol(_) => "CHRONOS-004",
            Self::Config(_) => "CHRONOS-005",
            Self::SnapshotIo(_) => "CHRONOS-006",
            Self::SnapshotCorrupted(_) => "CHRONOS-007",
            Self::Internal(_) => "CHRONOS-008",
        }
    }

    /// Returns true if this error is recoverable (the subsystem that raised
    /// it can keep serving without operator intervention).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::SnapshotCorrupted(_))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::KeyTooLong(2000).code(), "CHRONOS-001");
        assert_eq!(Error::Internal("x".into()).code(), "CHRONOS-008");
    }

    #[test]
    fn internal_and_corrupted_are_unrecoverable() {
        assert!(!Error::Internal("x".into()).is_recoverable());
        assert!(!Error::SnapshotCorrupted("x".into()).is_recoverable());
        assert!(Error::KeyTooLong(2000).is_recoverable());
        assert!(Error::NotFound("k".into()).is_recoverable());
    }
}
