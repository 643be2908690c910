//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// hash_id is not a UUID.
    #[error("Invalid hash_id '{0}': not a UUID")]
    InvalidHashId(String),

    /// hash_id is a UUID without an embedded timestamp (not v1/v6/v7).
    #[error("hash_id '{0}' carries no embedded timestamp")]
    MissingTimestamp(String),

    /// Embedded timestamp is outside the representable range.
    #[error("hash_id '{0}' has an out-of-range timestamp")]
    TimestampOutOfRange(String),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
