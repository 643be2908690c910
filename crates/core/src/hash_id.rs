//! Submission time embedded in time-ordered hash_ids.
//!
//! hash_ids are UUIDs carrying a timestamp (v1 for Chainpoint, v6/v7 accepted).
//! The embedded time is the source of truth for `hash_submitted_*_at`; the
//! wall clock at processing time is never used.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::constants::SUBMITTED_AT_FORMAT;
use crate::error::{CoreError, Result};

/// Extract the submission time embedded in a hash_id.
///
/// # Errors
///
/// - [`CoreError::InvalidHashId`] if `hash_id` is not a UUID
/// - [`CoreError::MissingTimestamp`] if the UUID version carries no time
pub fn submitted_at(hash_id: &str) -> Result<DateTime<Utc>> {
    let uuid = Uuid::parse_str(hash_id).map_err(|_| CoreError::InvalidHashId(hash_id.to_string()))?;

    let timestamp = uuid
        .get_timestamp()
        .ok_or_else(|| CoreError::MissingTimestamp(hash_id.to_string()))?;

    let (secs, nanos) = timestamp.to_unix();
    let secs = i64::try_from(secs).map_err(|_| CoreError::TimestampOutOfRange(hash_id.to_string()))?;

    DateTime::<Utc>::from_timestamp(secs, nanos)
        .ok_or_else(|| CoreError::TimestampOutOfRange(hash_id.to_string()))
}

/// Format a timestamp as ISO 8601 without fractional seconds.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(SUBMITTED_AT_FORMAT).to_string()
}
