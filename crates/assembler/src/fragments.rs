//! Fragment rows as stored by the upstream pipeline stages.
//!
//! State bodies are kept as the raw JSON text read from storage and decoded
//! during assembly, so one corrupt row only fails the hash_ids that use it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AssemblyError, Result};

/// Fragment table a row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Aggregation state, keyed by hash_id.
    Agg,
    /// Calendar state, keyed by agg_id.
    Cal,
    /// Bitcoin anchor aggregation state, keyed by cal_id.
    AnchorBtcAgg,
    /// Bitcoin transaction state, keyed by anchor_btc_agg_id.
    BtcTx,
    /// Bitcoin head state, keyed by btctx_id.
    BtcHead,
}

impl FragmentKind {
    /// Short name used in logs and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Agg => "agg",
            FragmentKind::Cal => "cal",
            FragmentKind::AnchorBtcAgg => "anchor_btc_agg",
            FragmentKind::BtcTx => "btctx",
            FragmentKind::BtcHead => "btchead",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row that can be found by one natural key.
pub trait FragmentRow: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table the row belongs to.
    const KIND: FragmentKind;

    /// Value of the lookup key.
    fn key(&self) -> &str;
}

/// Row of `agg_states`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggStateRow {
    /// Submitted hash identifier.
    pub hash_id: String,
    /// Submitted hash (hex).
    pub hash: String,
    /// Aggregation the hash was folded into.
    pub agg_id: String,
    /// JSON encoded [`proofgen_core::AggState`].
    pub agg_state: String,
}

impl FragmentRow for AggStateRow {
    const KIND: FragmentKind = FragmentKind::Agg;

    fn key(&self) -> &str {
        &self.hash_id
    }
}

/// Row of `cal_states`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalStateRow {
    /// Aggregation embedded in the calendar entry.
    pub agg_id: String,
    /// Calendar entry id.
    pub cal_id: String,
    /// JSON encoded [`proofgen_core::CalState`].
    pub cal_state: String,
}

impl FragmentRow for CalStateRow {
    const KIND: FragmentKind = FragmentKind::Cal;

    fn key(&self) -> &str {
        &self.agg_id
    }
}

/// Row of `anchor_btc_agg_states`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorBtcAggStateRow {
    /// Calendar entry grouped into the anchor aggregation.
    pub cal_id: String,
    /// Anchor aggregation id.
    pub anchor_btc_agg_id: String,
    /// JSON encoded [`proofgen_core::AnchorBtcAggState`].
    pub anchor_btc_agg_state: String,
}

impl FragmentRow for AnchorBtcAggStateRow {
    const KIND: FragmentKind = FragmentKind::AnchorBtcAgg;

    fn key(&self) -> &str {
        &self.cal_id
    }
}

/// Row of `btctx_states`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcTxStateRow {
    /// Anchor aggregation the transaction commits to.
    pub anchor_btc_agg_id: String,
    /// Bitcoin transaction id.
    pub btctx_id: String,
    /// JSON encoded [`proofgen_core::BtcTxState`].
    pub btctx_state: String,
}

impl FragmentRow for BtcTxStateRow {
    const KIND: FragmentKind = FragmentKind::BtcTx;

    fn key(&self) -> &str {
        &self.anchor_btc_agg_id
    }
}

/// Row of `btchead_states`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcHeadStateRow {
    /// Confirmed transaction id.
    pub btctx_id: String,
    /// Height of the confirming block.
    pub btchead_height: i64,
    /// JSON encoded [`proofgen_core::BtcHeadState`].
    pub btchead_state: String,
}

impl FragmentRow for BtcHeadStateRow {
    const KIND: FragmentKind = FragmentKind::BtcHead;

    fn key(&self) -> &str {
        &self.btctx_id
    }
}

/// Decode a raw state body.
///
/// `hash_id` is the proof being assembled, for error attribution.
pub fn decode_state<T: DeserializeOwned>(raw: &str, kind: FragmentKind, hash_id: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| AssemblyError::InvalidState {
        hash_id: hash_id.to_string(),
        kind: kind.as_str(),
        message: e.to_string(),
    })
}
