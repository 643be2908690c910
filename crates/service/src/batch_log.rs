//! Timing and throughput logs for generated batches.
//!
//! Purely observational: nothing here affects how an event is processed.

use chrono::{DateTime, Utc};
use proofgen_core::BatchType;
use rand::RngCore;
use std::time::{Duration, Instant};
use tracing::info;

/// Tracks one batch from first to last stored proof.
#[derive(Debug)]
pub struct BatchLogger {
    batch_type: BatchType,
    batch_id: String,
    batch_size: usize,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl BatchLogger {
    /// Start timing a batch of `batch_size` proofs under a fresh random id.
    pub fn start(batch_type: BatchType, batch_size: usize) -> Self {
        let mut id = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut id);

        Self {
            batch_type,
            batch_id: hex::encode(id),
            batch_size,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Short random batch identifier (8 hex chars).
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Log the first proof of the batch.
    pub fn starting(&self, first_submitted_at: &str) {
        info!(
            batch_type = %self.batch_type,
            batch_id = %self.batch_id,
            started_at = %self.started_at.to_rfc3339(),
            "Generation starting for {} {} proof 1 of {} : {} after submission",
            self.batch_type,
            self.batch_id,
            self.batch_size,
            since_submission(first_submitted_at, Utc::now()),
        );
    }

    /// Log the last proof of the batch with the total processing time.
    ///
    /// Batches of one proof are fully described by [`BatchLogger::starting`].
    pub fn complete(&self, last_submitted_at: &str, stored: usize) {
        if self.batch_size < 2 {
            return;
        }
        let elapsed = self.started.elapsed();
        info!(
            batch_type = %self.batch_type,
            batch_id = %self.batch_id,
            started_at = %self.started_at.to_rfc3339(),
            finished_at = %Utc::now().to_rfc3339(),
            stored,
            elapsed_ms = elapsed.as_millis() as u64,
            "Generation complete for {} {} proof {} of {} : {} after submission {}",
            self.batch_type,
            self.batch_id,
            self.batch_size,
            self.batch_size,
            since_submission(last_submitted_at, Utc::now()),
            processing_summary(elapsed),
        );
    }
}

/// Time between a `hash_submitted_*_at` value and `now`, for operators.
fn since_submission(submitted_at: &str, now: DateTime<Utc>) -> String {
    match DateTime::parse_from_rfc3339(submitted_at) {
        Ok(at) => format_duration((now - at.with_timezone(&Utc)).to_std().unwrap_or_default()),
        Err(_) => "unknown time".to_string(),
    }
}

/// "1 hour, 2 minutes, and 3 seconds".
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{}, {}, and {}",
        unit(total / 3600, "hour"),
        unit(total % 3600 / 60, "minute"),
        unit(total % 60, "second")
    )
}

/// Batch processing time: whole seconds above one second, else milliseconds.
pub fn processing_summary(elapsed: Duration) -> String {
    let ms = elapsed.as_millis() as u64;
    if ms > 1000 {
        format!("[{} total]", unit((ms as f64 / 1000.0).round() as u64, "second"))
    } else if ms > 0 {
        format!("[{}]", unit(ms, "millisecond"))
    } else {
        String::new()
    }
}

fn unit(n: u64, name: &str) -> String {
    format!("{} {}{}", n, name, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_plurals() {
        assert_eq!(
            format_duration(Duration::from_secs(3600 + 60 + 1)),
            "1 hour, 1 minute, and 1 second"
        );
        assert_eq!(
            format_duration(Duration::from_secs(2 * 3600 + 5 * 60 + 30)),
            "2 hours, 5 minutes, and 30 seconds"
        );
        assert_eq!(format_duration(Duration::ZERO), "0 hours, 0 minutes, and 0 seconds");
    }

    #[test]
    fn test_processing_summary() {
        assert_eq!(processing_summary(Duration::from_millis(2600)), "[3 seconds total]");
        assert_eq!(processing_summary(Duration::from_millis(250)), "[250 milliseconds]");
        assert_eq!(processing_summary(Duration::from_millis(1)), "[1 millisecond]");
        assert_eq!(processing_summary(Duration::ZERO), "");
    }

    #[test]
    fn test_since_submission() {
        let now = DateTime::parse_from_rfc3339("2019-01-01T01:00:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            since_submission("2019-01-01T00:00:00Z", now),
            "1 hour, 0 minutes, and 30 seconds"
        );
        assert_eq!(since_submission("yesterday", now), "unknown time");
    }

    #[test]
    fn test_batch_id_is_eight_hex_chars() {
        let logger = BatchLogger::start(BatchType::CalBatch, 3);
        assert_eq!(logger.batch_id().len(), 8);
        assert!(logger.batch_id().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
