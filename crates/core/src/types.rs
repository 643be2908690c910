//! Core types for Chainpoint proofs and the state fragments they are built from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{MSG_TYPE_BTC_BATCH, MSG_TYPE_CAL_BATCH, MSG_TYPE_ETH};
use crate::error::CoreError;

/// Hash function applied by an `{"op": ...}` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashOp {
    /// SHA-224
    #[serde(rename = "sha-224")]
    Sha224,
    /// SHA-256
    #[serde(rename = "sha-256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "sha-384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "sha-512")]
    Sha512,
    /// SHA3-224
    #[serde(rename = "sha3-224")]
    Sha3_224,
    /// SHA3-256
    #[serde(rename = "sha3-256")]
    Sha3_256,
    /// SHA3-384
    #[serde(rename = "sha3-384")]
    Sha3_384,
    /// SHA3-512
    #[serde(rename = "sha3-512")]
    Sha3_512,
    /// SHA-256 applied twice (Bitcoin style).
    #[serde(rename = "sha-256-x2")]
    Sha256X2,
}

/// One step of a Merkle inclusion proof.
///
/// Serialized as a single-key JSON object: `{"l": "..."}`, `{"r": "..."}`,
/// `{"op": "sha-256"}` or `{"anchors": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Prepend this value to the running hash input.
    #[serde(rename = "l")]
    Left(String),
    /// Append this value to the running hash input.
    #[serde(rename = "r")]
    Right(String),
    /// Hash the running value.
    #[serde(rename = "op")]
    Hash(HashOp),
    /// Terminal anchor marker.
    #[serde(rename = "anchors")]
    Anchors(Vec<Anchor>),
}

impl Op {
    /// Build the single trailing anchor op of a branch.
    pub fn anchor(anchor_type: AnchorType, anchor: &AnchorRef) -> Self {
        Op::Anchors(vec![Anchor {
            anchor_type,
            anchor_id: anchor.anchor_id.clone(),
            uris: anchor.uris.clone(),
        }])
    }
}

/// Ledger an anchor points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorType {
    /// Calendar (mainnet)
    Cal,
    /// Calendar (testnet)
    Tcal,
    /// Bitcoin mainnet
    Btc,
    /// Bitcoin testnet
    Tbtc,
    /// Ethereum mainnet
    Eth,
    /// Ethereum testnet
    Teth,
}

impl AnchorType {
    /// Tag as written in the proof.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorType::Cal => "cal",
            AnchorType::Tcal => "tcal",
            AnchorType::Btc => "btc",
            AnchorType::Tbtc => "tbtc",
            AnchorType::Eth => "eth",
            AnchorType::Teth => "teth",
        }
    }

    /// Bitcoin anchors commit to the block merkle root, which is displayed byte-reversed.
    pub fn is_bitcoin(&self) -> bool {
        matches!(self, AnchorType::Btc | AnchorType::Tbtc)
    }
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed anchor as it appears inside a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor type tag (`cal`, `tcal`, `btc`, `tbtc`, ...)
    #[serde(rename = "type")]
    pub anchor_type: AnchorType,
    /// Ledger-specific identifier (calendar block height, Bitcoin block height).
    pub anchor_id: String,
    /// URIs where the anchored value can be retrieved.
    pub uris: Vec<String>,
}

/// Untyped anchor reference stored by the upstream stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRef {
    /// Ledger-specific identifier.
    pub anchor_id: String,
    /// URIs where the anchored value can be retrieved.
    #[serde(default)]
    pub uris: Vec<String>,
}

/// Ops produced when a submitted hash is folded into an aggregation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggState {
    /// Ops from the submitted hash to the aggregation root.
    pub ops: Vec<Op>,
}

/// Ops and anchor produced when a calendar entry embeds an aggregation root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalState {
    /// Ops from the aggregation root to the calendar block hash.
    pub ops: Vec<Op>,
    /// Calendar block the proof anchors into.
    pub anchor: AnchorRef,
}

/// Ops produced when calendar entries are grouped for one Bitcoin transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorBtcAggState {
    /// Ops from the calendar block hash to the anchor aggregation root.
    pub ops: Vec<Op>,
}

/// Ops produced when the Bitcoin transaction is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcTxState {
    /// Ops from the anchor aggregation root to the transaction id.
    pub ops: Vec<Op>,
}

/// Ops and anchor produced when the Bitcoin transaction is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcHeadState {
    /// Ops from the transaction id to the block merkle root.
    pub ops: Vec<Op>,
    /// Bitcoin block the proof anchors into.
    pub anchor: AnchorRef,
}

/// A labeled, ordered sequence of ops with optional nested branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch label (`cal_anchor_branch`, `btc_anchor_branch`).
    pub label: String,
    /// Ops in evaluation order.
    pub ops: Vec<Op>,
    /// Child branches, evaluated from this branch's final value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
}

/// A complete Chainpoint v3 proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// JSON-LD context URI.
    #[serde(rename = "@context")]
    pub context: String,
    /// Always `Chainpoint`.
    #[serde(rename = "type")]
    pub proof_type: String,
    /// Submitted hash (hex).
    pub hash: String,
    /// hash_id as seen by the node.
    pub hash_id_node: String,
    /// Submission time as seen by the node.
    pub hash_submitted_node_at: String,
    /// hash_id as seen by the core.
    pub hash_id_core: String,
    /// Submission time as seen by the core.
    pub hash_submitted_core_at: String,
    /// Anchor branches.
    pub branches: Vec<Branch>,
}

/// Category of a proof-ready event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchType {
    /// Calendar anchoring completed.
    CalBatch,
    /// Bitcoin anchoring completed.
    BtcBatch,
    /// Ethereum anchoring completed.
    Eth,
}

impl BatchType {
    /// Message type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::CalBatch => MSG_TYPE_CAL_BATCH,
            BatchType::BtcBatch => MSG_TYPE_BTC_BATCH,
            BatchType::Eth => MSG_TYPE_ETH,
        }
    }
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            MSG_TYPE_CAL_BATCH => Ok(BatchType::CalBatch),
            MSG_TYPE_BTC_BATCH => Ok(BatchType::BtcBatch),
            MSG_TYPE_ETH => Ok(BatchType::Eth),
            other => Err(CoreError::Other(format!("Unknown batch type: {}", other))),
        }
    }
}

/// Network the service anchors into; selects the anchor type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Production network.
    #[default]
    Mainnet,
    /// Test network.
    Testnet,
}

impl NetworkMode {
    /// Anchor type of the calendar branch.
    pub fn calendar_anchor_type(&self) -> AnchorType {
        match self {
            NetworkMode::Mainnet => AnchorType::Cal,
            NetworkMode::Testnet => AnchorType::Tcal,
        }
    }

    /// Anchor type of the Bitcoin branch.
    pub fn bitcoin_anchor_type(&self) -> AnchorType {
        match self {
            NetworkMode::Mainnet => AnchorType::Btc,
            NetworkMode::Testnet => AnchorType::Tbtc,
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Mainnet => f.write_str("mainnet"),
            NetworkMode::Testnet => f.write_str("testnet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_wire_shape() {
        let ops = vec![
            Op::Left("ab".to_string()),
            Op::Right("cd".to_string()),
            Op::Hash(HashOp::Sha256),
            Op::Hash(HashOp::Sha256X2),
        ];
        let value = serde_json::to_value(&ops).unwrap();
        assert_eq!(
            value,
            json!([{"l": "ab"}, {"r": "cd"}, {"op": "sha-256"}, {"op": "sha-256-x2"}])
        );
    }

    #[test]
    fn test_anchor_op_shape() {
        let anchor = AnchorRef {
            anchor_id: "c1".to_string(),
            uris: vec!["uri1".to_string()],
        };
        let op = Op::anchor(AnchorType::Tcal, &anchor);
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"anchors": [{"type": "tcal", "anchor_id": "c1", "uris": ["uri1"]}]})
        );
    }

    #[test]
    fn test_cal_state_parses_upstream_json() {
        let raw = r#"{"ops":[{"r":"aa"},{"op":"sha-256"}],"anchor":{"anchor_id":"1027","uris":["https://a.example/calendar/1027/hash"]}}"#;
        let state: CalState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.ops.len(), 2);
        assert_eq!(state.anchor.anchor_id, "1027");
    }

    #[test]
    fn test_unknown_op_rejected() {
        let raw = r#"{"ops":[{"x":"aa"}]}"#;
        assert!(serde_json::from_str::<AggState>(raw).is_err());
    }

    #[test]
    fn test_branch_omits_empty_children() {
        let branch = Branch {
            label: "cal_anchor_branch".to_string(),
            ops: vec![Op::Hash(HashOp::Sha256)],
            branches: vec![],
        };
        let value = serde_json::to_value(&branch).unwrap();
        assert!(value.get("branches").is_none());
    }

    #[test]
    fn test_batch_type_roundtrip_tags() {
        for tag in ["cal_batch", "btc_batch", "eth"] {
            let parsed: BatchType = tag.parse().unwrap();
            assert_eq!(parsed.as_str(), tag);
        }
        assert!("anchor_eth".parse::<BatchType>().is_err());
    }

    #[test]
    fn test_network_anchor_types() {
        assert_eq!(NetworkMode::Mainnet.calendar_anchor_type(), AnchorType::Cal);
        assert_eq!(NetworkMode::Testnet.calendar_anchor_type(), AnchorType::Tcal);
        assert_eq!(NetworkMode::Mainnet.bitcoin_anchor_type(), AnchorType::Btc);
        assert_eq!(NetworkMode::Testnet.bitcoin_anchor_type(), AnchorType::Tbtc);
    }
}
