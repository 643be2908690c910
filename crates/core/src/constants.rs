//! Canonical Chainpoint v3 protocol constants.

/// JSON-LD context embedded in every proof.
pub const CHAINPOINT_CONTEXT_V3: &str = "https://w3id.org/chainpoint/v3";

/// Value of the proof `type` field.
pub const CHAINPOINT_PROOF_TYPE: &str = "Chainpoint";

/// Label of the calendar branch (top level of `branches`).
pub const CAL_ANCHOR_BRANCH: &str = "cal_anchor_branch";

/// Label of the Bitcoin branch (nested under the calendar branch).
pub const BTC_ANCHOR_BRANCH: &str = "btc_anchor_branch";

/// Timestamp format used for `hash_submitted_*_at` (ISO 8601, no fractional seconds).
pub const SUBMITTED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Message type tag of a calendar batch completion event.
pub const MSG_TYPE_CAL_BATCH: &str = "cal_batch";

/// Message type tag of a Bitcoin batch completion event.
pub const MSG_TYPE_BTC_BATCH: &str = "btc_batch";

/// Message type tag of an Ethereum anchor event (recognized, not assembled).
pub const MSG_TYPE_ETH: &str = "eth";
