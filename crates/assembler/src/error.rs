//! Error types for proof assembly.

use proofgen_core::CoreError;
use thiserror::Error;

/// Reason a single hash_id could not be turned into a proof.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// No aggregation state row exists for the hash_id.
    #[error("no aggregation state for hash_id {hash_id}")]
    MissingAggState {
        /// Requested hash_id.
        hash_id: String,
    },

    /// The aggregation has no calendar state.
    #[error("no calendar state for agg_id {agg_id} (hash_id {hash_id})")]
    MissingCalState {
        /// Requested hash_id.
        hash_id: String,
        /// Aggregation id that has no calendar entry.
        agg_id: String,
    },

    /// The calendar entry was not grouped into a Bitcoin anchor aggregation.
    #[error("no anchor_btc_agg state for cal_id {cal_id} (hash_id {hash_id})")]
    MissingAnchorBtcAggState {
        /// Requested hash_id.
        hash_id: String,
        /// Calendar id without an anchor aggregation.
        cal_id: String,
    },

    /// The Bitcoin anchor aggregation has no transaction/head state.
    #[error("no btc tx/head state for anchor_btc_agg_id {anchor_btc_agg_id} (hash_id {hash_id})")]
    MissingBtcChain {
        /// Requested hash_id.
        hash_id: String,
        /// Anchor aggregation id without a confirmed transaction.
        anchor_btc_agg_id: String,
    },

    /// A stored state body could not be decoded.
    #[error("invalid {kind} state for hash_id {hash_id}: {message}")]
    InvalidState {
        /// Requested hash_id.
        hash_id: String,
        /// Fragment kind (`agg`, `cal`, ...).
        kind: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The hash_id carries no usable submission time.
    #[error(transparent)]
    HashId(#[from] CoreError),
}

impl AssemblyError {
    /// hash_id the failure belongs to, when known.
    pub fn hash_id(&self) -> Option<&str> {
        match self {
            AssemblyError::MissingAggState { hash_id }
            | AssemblyError::MissingCalState { hash_id, .. }
            | AssemblyError::MissingAnchorBtcAggState { hash_id, .. }
            | AssemblyError::MissingBtcChain { hash_id, .. }
            | AssemblyError::InvalidState { hash_id, .. } => Some(hash_id),
            AssemblyError::HashId(_) => None,
        }
    }
}

/// Result type alias for AssemblyError.
pub type Result<T> = std::result::Result<T, AssemblyError>;
