//! Failure classes for one processed event.
//!
//! The class decides how the event is settled: transport faults are
//! rejected so the queue redelivers them, everything else is acknowledged.

use thiserror::Error;

/// Why an event could not be fully processed.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Queue, cache or database unreachable. The event is requeued.
    #[error("transport fault: {0}")]
    Transport(String),

    /// Required proof state will never exist. The event is dropped.
    #[error("unrecoverable proof state: {0}")]
    UnrecoverableState(String),

    /// The event body cannot be decoded. The event is dropped.
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl ProcessError {
    /// True if the event should be redelivered.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProcessError::Transport(_))
    }

    /// Classify a storage failure.
    ///
    /// Database errors reached through `anyhow` context are inspected; an
    /// error without a transport cause is a data fault.
    pub fn from_storage(err: anyhow::Error) -> Self {
        if is_transport_anyhow(&err) {
            ProcessError::Transport(format!("{:#}", err))
        } else {
            ProcessError::UnrecoverableState(format!("{:#}", err))
        }
    }
}

/// Primary SQLite result codes for a busy or locked database.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// True for database errors that a later retry can succeed past.
///
/// Covers lost connections and a database held busy or locked by another
/// connection.
pub fn is_transport_error(err: &sqlx::Error) -> bool {
    is_connection_error(err) || is_contention_error(err)
}

/// True for database errors that need a new connection pool.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn is_contention_error(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    // SQLite reports extended codes; the low byte is the primary code.
    db.code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// True if any cause in the chain is a transport-class database error.
pub fn is_transport_anyhow(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .any(is_transport_error)
}

/// True if any cause in the chain means the pool must be replaced.
pub fn is_connection_anyhow(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .any(is_connection_error)
}
