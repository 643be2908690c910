//! Per-event lookup tables.
//!
//! One event can carry many hash_ids sharing an aggregation, a calendar entry
//! or a Bitcoin anchor aggregation. Each table is built once per event from
//! the fetched rows and decodes every state body once; assembly then resolves
//! each hash_id by key without touching storage again.

use std::collections::{HashMap, HashSet};

use proofgen_core::{AnchorBtcAggState, BtcHeadState, BtcTxState, CalState};

use crate::error::{AssemblyError, Result};
use crate::fragments::{
    decode_state, AnchorBtcAggStateRow, BtcHeadStateRow, BtcTxStateRow, CalStateRow, FragmentKind,
};

/// Decoded state or the decoder message.
type Decoded<T> = std::result::Result<T, String>;

fn decode_once<T: serde::de::DeserializeOwned>(raw: &str, kind: FragmentKind) -> Decoded<T> {
    decode_state(raw, kind, "").map_err(|e| match e {
        AssemblyError::InvalidState { message, .. } => message,
        other => other.to_string(),
    })
}

fn invalid(hash_id: &str, kind: FragmentKind, message: &str) -> AssemblyError {
    AssemblyError::InvalidState {
        hash_id: hash_id.to_string(),
        kind: kind.as_str(),
        message: message.to_string(),
    }
}

/// agg_id → calendar entry.
#[derive(Debug, Default)]
pub struct CalendarLookup {
    entries: HashMap<String, (String, Decoded<CalState>)>,
}

impl CalendarLookup {
    /// Index calendar rows by agg_id.
    pub fn build(rows: impl IntoIterator<Item = CalStateRow>) -> Self {
        let entries = rows
            .into_iter()
            .map(|row| {
                let state = decode_once(&row.cal_state, FragmentKind::Cal);
                (row.agg_id, (row.cal_id, state))
            })
            .collect();
        Self { entries }
    }

    /// Calendar id and state for `agg_id`.
    pub fn resolve(&self, hash_id: &str, agg_id: &str) -> Result<(&str, &CalState)> {
        match self.entries.get(agg_id) {
            Some((cal_id, Ok(state))) => Ok((cal_id.as_str(), state)),
            Some((_, Err(message))) => Err(invalid(hash_id, FragmentKind::Cal, message)),
            None => Err(AssemblyError::MissingCalState {
                hash_id: hash_id.to_string(),
                agg_id: agg_id.to_string(),
            }),
        }
    }

    /// Distinct calendar ids, in first-seen order of `agg_ids`.
    pub fn cal_ids<'a>(&self, agg_ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = HashSet::new();
        agg_ids
            .into_iter()
            .filter_map(|agg_id| self.entries.get(agg_id))
            .filter(|(cal_id, _)| seen.insert(cal_id.clone()))
            .map(|(cal_id, _)| cal_id.clone())
            .collect()
    }

    /// Number of indexed aggregations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no calendar row was fetched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// cal_id → Bitcoin anchor aggregation.
#[derive(Debug, Default)]
pub struct AnchorAggLookup {
    entries: HashMap<String, (String, Decoded<AnchorBtcAggState>)>,
    order: Vec<String>,
}

impl AnchorAggLookup {
    /// Index anchor aggregation rows by cal_id.
    pub fn build(rows: impl IntoIterator<Item = AnchorBtcAggStateRow>) -> Self {
        let mut entries = HashMap::new();
        let mut order = Vec::new();
        for row in rows {
            if !order.contains(&row.anchor_btc_agg_id) {
                order.push(row.anchor_btc_agg_id.clone());
            }
            let state = decode_once(&row.anchor_btc_agg_state, FragmentKind::AnchorBtcAgg);
            entries.insert(row.cal_id, (row.anchor_btc_agg_id, state));
        }
        Self { entries, order }
    }

    /// Anchor aggregation id and state for `cal_id`.
    pub fn resolve(&self, hash_id: &str, cal_id: &str) -> Result<(&str, &AnchorBtcAggState)> {
        match self.entries.get(cal_id) {
            Some((id, Ok(state))) => Ok((id.as_str(), state)),
            Some((_, Err(message))) => Err(invalid(hash_id, FragmentKind::AnchorBtcAgg, message)),
            None => Err(AssemblyError::MissingAnchorBtcAggState {
                hash_id: hash_id.to_string(),
                cal_id: cal_id.to_string(),
            }),
        }
    }

    /// Distinct anchor aggregation ids in row order.
    pub fn anchor_btc_agg_ids(&self) -> &[String] {
        &self.order
    }

    /// True if no anchor aggregation row was fetched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Transaction and head state confirming one anchor aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcChain {
    /// Bitcoin transaction id.
    pub btctx_id: String,
    /// Height of the confirming block.
    pub btchead_height: i64,
    /// Transaction ops.
    pub tx: BtcTxState,
    /// Block header ops and anchor.
    pub head: BtcHeadState,
}

/// anchor_btc_agg_id → confirmed Bitcoin chain.
///
/// An anchor aggregation is present only when both its transaction and
/// head rows were fetched.
#[derive(Debug, Default)]
pub struct BtcChainLookup {
    // Decode failures keep the kind of the row that failed.
    chains: HashMap<String, std::result::Result<BtcChain, (FragmentKind, String)>>,
}

impl BtcChainLookup {
    /// Join transaction rows with head rows on btctx_id.
    pub fn build(
        tx_rows: impl IntoIterator<Item = BtcTxStateRow>,
        head_rows: impl IntoIterator<Item = BtcHeadStateRow>,
    ) -> Self {
        let heads: HashMap<String, BtcHeadStateRow> = head_rows
            .into_iter()
            .map(|row| (row.btctx_id.clone(), row))
            .collect();

        let chains = tx_rows
            .into_iter()
            .filter_map(|tx_row| {
                let head_row = heads.get(&tx_row.btctx_id)?;
                let chain = decode_once::<BtcTxState>(&tx_row.btctx_state, FragmentKind::BtcTx)
                    .map_err(|message| (FragmentKind::BtcTx, message))
                    .and_then(|tx| {
                        let head = decode_once::<BtcHeadState>(
                            &head_row.btchead_state,
                            FragmentKind::BtcHead,
                        )
                        .map_err(|message| (FragmentKind::BtcHead, message))?;
                        Ok(BtcChain {
                            btctx_id: tx_row.btctx_id.clone(),
                            btchead_height: head_row.btchead_height,
                            tx,
                            head,
                        })
                    });
                Some((tx_row.anchor_btc_agg_id, chain))
            })
            .collect();

        Self { chains }
    }

    /// Confirmed chain for `anchor_btc_agg_id`.
    pub fn resolve(&self, hash_id: &str, anchor_btc_agg_id: &str) -> Result<&BtcChain> {
        match self.chains.get(anchor_btc_agg_id) {
            Some(Ok(chain)) => Ok(chain),
            Some(Err((kind, message))) => Err(invalid(hash_id, *kind, message)),
            None => Err(AssemblyError::MissingBtcChain {
                hash_id: hash_id.to_string(),
                anchor_btc_agg_id: anchor_btc_agg_id.to_string(),
            }),
        }
    }

    /// True if `anchor_btc_agg_id` has a fetched chain.
    pub fn contains(&self, anchor_btc_agg_id: &str) -> bool {
        self.chains.contains_key(anchor_btc_agg_id)
    }

    /// True if no chain resolved.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
