//! Proof composition.
//!
//! The `compose_*` functions are pure: the same fragments always produce the
//! same proof. [`ProofAssembler`] applies them to every hash_id of one event
//! and isolates per-hash_id failures.

use std::collections::{HashMap, HashSet};

use proofgen_core::{
    format_timestamp, submitted_at, AggState, AnchorBtcAggState, Branch, BtcHeadState, BtcTxState,
    CalState, NetworkMode, Op, Proof, BTC_ANCHOR_BRANCH, CAL_ANCHOR_BRANCH, CHAINPOINT_CONTEXT_V3,
    CHAINPOINT_PROOF_TYPE,
};

use crate::error::{AssemblyError, Result};
use crate::fragments::{decode_state, AggStateRow, FragmentKind};
use crate::lookup::{AnchorAggLookup, BtcChainLookup, CalendarLookup};

/// Proof header with no branches yet.
///
/// Both submission times come from the time embedded in `hash_id`.
pub fn compose_header(hash: &str, hash_id: &str) -> Result<Proof> {
    let submitted = format_timestamp(&submitted_at(hash_id)?);

    Ok(Proof {
        context: CHAINPOINT_CONTEXT_V3.to_string(),
        proof_type: CHAINPOINT_PROOF_TYPE.to_string(),
        hash: hash.to_string(),
        hash_id_node: hash_id.to_string(),
        hash_submitted_node_at: submitted.clone(),
        hash_id_core: hash_id.to_string(),
        hash_submitted_core_at: submitted,
        branches: Vec::new(),
    })
}

/// Calendar branch: aggregation ops, calendar ops, calendar anchor.
pub fn compose_calendar_branch(network: NetworkMode, agg: &AggState, cal: &CalState) -> Branch {
    let mut ops = Vec::with_capacity(agg.ops.len() + cal.ops.len() + 1);
    ops.extend(agg.ops.iter().cloned());
    ops.extend(cal.ops.iter().cloned());
    ops.push(Op::anchor(network.calendar_anchor_type(), &cal.anchor));

    Branch {
        label: CAL_ANCHOR_BRANCH.to_string(),
        ops,
        branches: Vec::new(),
    }
}

/// Bitcoin branch: anchor aggregation ops, transaction ops, head ops, Bitcoin anchor.
pub fn compose_bitcoin_branch(
    network: NetworkMode,
    anchor_agg: &AnchorBtcAggState,
    tx: &BtcTxState,
    head: &BtcHeadState,
) -> Branch {
    let mut ops = Vec::with_capacity(anchor_agg.ops.len() + tx.ops.len() + head.ops.len() + 1);
    ops.extend(anchor_agg.ops.iter().cloned());
    ops.extend(tx.ops.iter().cloned());
    ops.extend(head.ops.iter().cloned());
    ops.push(Op::anchor(network.bitcoin_anchor_type(), &head.anchor));

    Branch {
        label: BTC_ANCHOR_BRANCH.to_string(),
        ops,
        branches: Vec::new(),
    }
}

/// A hash_id that produced no proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Requested hash_id.
    pub hash_id: String,
    /// Why assembly failed.
    pub error: AssemblyError,
}

/// Outcome of assembling one event.
#[derive(Debug, Default)]
pub struct BatchAssembly {
    /// Proofs in requested hash_id order.
    pub proofs: Vec<Proof>,
    /// hash_ids without a proof.
    pub failures: Vec<ItemFailure>,
}

impl BatchAssembly {
    fn record(&mut self, hash_id: &str, outcome: Result<Proof>) {
        match outcome {
            Ok(proof) => self.proofs.push(proof),
            Err(error) => self.failures.push(ItemFailure {
                hash_id: hash_id.to_string(),
                error,
            }),
        }
    }
}

/// Builds proofs for the hash_ids of one event.
#[derive(Debug, Clone, Copy)]
pub struct ProofAssembler {
    network: NetworkMode,
}

impl ProofAssembler {
    /// Create an assembler for `network`.
    pub fn new(network: NetworkMode) -> Self {
        Self { network }
    }

    /// Network the anchors are tagged for.
    pub fn network(&self) -> NetworkMode {
        self.network
    }

    /// Calendar-anchored proofs.
    pub fn assemble_cal_batch(
        &self,
        hash_ids: &[String],
        agg_rows: &[AggStateRow],
        calendar: &CalendarLookup,
    ) -> BatchAssembly {
        let aggs = index_agg_rows(agg_rows);
        let mut out = BatchAssembly::default();

        for hash_id in dedup(hash_ids) {
            let outcome = self.calendar_proof(hash_id, &aggs, calendar).map(|(proof, _)| proof);
            out.record(hash_id, outcome);
        }
        out
    }

    /// Calendar and Bitcoin anchored proofs.
    pub fn assemble_btc_batch(
        &self,
        hash_ids: &[String],
        agg_rows: &[AggStateRow],
        calendar: &CalendarLookup,
        anchor_aggs: &AnchorAggLookup,
        chains: &BtcChainLookup,
    ) -> BatchAssembly {
        let aggs = index_agg_rows(agg_rows);
        let mut out = BatchAssembly::default();

        for hash_id in dedup(hash_ids) {
            let outcome = self
                .calendar_proof(hash_id, &aggs, calendar)
                .and_then(|(mut proof, cal_id)| {
                    let (anchor_btc_agg_id, anchor_agg) = anchor_aggs.resolve(hash_id, cal_id)?;
                    let chain = chains.resolve(hash_id, anchor_btc_agg_id)?;
                    let btc_branch =
                        compose_bitcoin_branch(self.network, anchor_agg, &chain.tx, &chain.head);
                    if let Some(cal_branch) = proof.branches.first_mut() {
                        cal_branch.branches = vec![btc_branch];
                    }
                    Ok(proof)
                });
            out.record(hash_id, outcome);
        }
        out
    }

    /// Header plus calendar branch, with the cal_id it resolved through.
    fn calendar_proof<'a>(
        &self,
        hash_id: &str,
        aggs: &HashMap<&str, &AggStateRow>,
        calendar: &'a CalendarLookup,
    ) -> Result<(Proof, &'a str)> {
        let row = aggs
            .get(hash_id)
            .ok_or_else(|| AssemblyError::MissingAggState {
                hash_id: hash_id.to_string(),
            })?;
        let agg: AggState = decode_state(&row.agg_state, FragmentKind::Agg, hash_id)?;
        let (cal_id, cal) = calendar.resolve(hash_id, &row.agg_id)?;

        let mut proof = compose_header(&row.hash, hash_id)?;
        proof.branches.push(compose_calendar_branch(self.network, &agg, cal));
        Ok((proof, cal_id))
    }
}

fn index_agg_rows(rows: &[AggStateRow]) -> HashMap<&str, &AggStateRow> {
    rows.iter().map(|row| (row.hash_id.as_str(), row)).collect()
}

/// Requested hash_ids in order, first occurrence only.
fn dedup(hash_ids: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    hash_ids
        .iter()
        .map(String::as_str)
        .filter(move |hash_id| seen.insert(*hash_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragments::{AnchorBtcAggStateRow, BtcHeadStateRow, BtcTxStateRow, CalStateRow};
    use proofgen_core::{AnchorRef, AnchorType, HashOp};
    use serde_json::json;
    use uuid::timestamp::context::ContextV1;
    use uuid::{Timestamp, Uuid};

    fn hash_id_at(secs: u64) -> String {
        let ts = Timestamp::from_unix(&ContextV1::new(0), secs, 0);
        Uuid::new_v1(ts, &[1, 2, 3, 4, 5, 6]).to_string()
    }

    fn agg_row(hash_id: &str, agg_id: &str) -> AggStateRow {
        AggStateRow {
            hash_id: hash_id.to_string(),
            hash: "ab".repeat(32),
            agg_id: agg_id.to_string(),
            agg_state: r#"{"ops":[{"l":"01"},{"op":"sha-256"}]}"#.to_string(),
        }
    }

    fn cal_row(agg_id: &str, cal_id: &str) -> CalStateRow {
        CalStateRow {
            agg_id: agg_id.to_string(),
            cal_id: cal_id.to_string(),
            cal_state: r#"{"ops":[{"r":"02"},{"op":"sha-256"}],"anchor":{"anchor_id":"c1","uris":["uri1"]}}"#
                .to_string(),
        }
    }

    fn btc_lookups(cal_id: &str) -> (AnchorAggLookup, BtcChainLookup) {
        let anchor_aggs = AnchorAggLookup::build(vec![AnchorBtcAggStateRow {
            cal_id: cal_id.to_string(),
            anchor_btc_agg_id: "x1".to_string(),
            anchor_btc_agg_state: r#"{"ops":[{"l":"03"}]}"#.to_string(),
        }]);
        let chains = BtcChainLookup::build(
            vec![BtcTxStateRow {
                anchor_btc_agg_id: "x1".to_string(),
                btctx_id: "t1".to_string(),
                btctx_state: r#"{"ops":[{"r":"04"}]}"#.to_string(),
            }],
            vec![BtcHeadStateRow {
                btctx_id: "t1".to_string(),
                btchead_height: 600_000,
                btchead_state:
                    r#"{"ops":[{"op":"sha-256-x2"}],"anchor":{"anchor_id":"600000","uris":["btc-uri"]}}"#
                        .to_string(),
            }],
        );
        (anchor_aggs, chains)
    }

    #[test]
    fn test_header_uses_hash_id_time() {
        let hash_id = hash_id_at(1_546_300_800);
        let proof = compose_header("ab", &hash_id).unwrap();
        assert_eq!(proof.context, CHAINPOINT_CONTEXT_V3);
        assert_eq!(proof.proof_type, "Chainpoint");
        assert_eq!(proof.hash_id_node, hash_id);
        assert_eq!(proof.hash_id_core, hash_id);
        assert_eq!(proof.hash_submitted_node_at, "2019-01-01T00:00:00Z");
        assert_eq!(proof.hash_submitted_core_at, "2019-01-01T00:00:00Z");
    }

    #[test]
    fn test_header_rejects_untimed_hash_id() {
        let hash_id = Uuid::new_v4().to_string();
        assert!(matches!(
            compose_header("ab", &hash_id),
            Err(AssemblyError::HashId(_))
        ));
    }

    #[test]
    fn test_calendar_branch_concatenation() {
        let agg = AggState {
            ops: vec![Op::Left("op1".to_string())],
        };
        let cal = CalState {
            ops: vec![Op::Right("op2".to_string())],
            anchor: AnchorRef {
                anchor_id: "c1".to_string(),
                uris: vec!["uri1".to_string()],
            },
        };

        for (network, tag) in [(NetworkMode::Mainnet, "cal"), (NetworkMode::Testnet, "tcal")] {
            let branch = compose_calendar_branch(network, &agg, &cal);
            assert_eq!(branch.label, CAL_ANCHOR_BRANCH);
            assert_eq!(
                serde_json::to_value(&branch.ops).unwrap(),
                json!([
                    {"l": "op1"},
                    {"r": "op2"},
                    {"anchors": [{"type": tag, "anchor_id": "c1", "uris": ["uri1"]}]}
                ])
            );
        }
    }

    #[test]
    fn test_bitcoin_branch_concatenation() {
        let anchor_agg = AnchorBtcAggState {
            ops: vec![Op::Left("a".to_string())],
        };
        let tx = BtcTxState {
            ops: vec![Op::Right("b".to_string())],
        };
        let head = BtcHeadState {
            ops: vec![Op::Hash(HashOp::Sha256X2)],
            anchor: AnchorRef {
                anchor_id: "600000".to_string(),
                uris: vec![],
            },
        };

        let branch = compose_bitcoin_branch(NetworkMode::Testnet, &anchor_agg, &tx, &head);
        assert_eq!(branch.label, BTC_ANCHOR_BRANCH);
        assert_eq!(branch.ops.len(), 4);
        assert_eq!(branch.ops[0], Op::Left("a".to_string()));
        assert_eq!(branch.ops[1], Op::Right("b".to_string()));
        assert_eq!(branch.ops[2], Op::Hash(HashOp::Sha256X2));
        match &branch.ops[3] {
            Op::Anchors(anchors) => {
                assert_eq!(anchors.len(), 1);
                assert_eq!(anchors[0].anchor_type, AnchorType::Tbtc);
                assert_eq!(anchors[0].anchor_id, "600000");
            }
            other => panic!("expected anchors op, got {:?}", other),
        }
    }

    #[test]
    fn test_cal_batch_isolates_missing_fragments() {
        let h1 = hash_id_at(1_600_000_000);
        let h2 = hash_id_at(1_600_000_001);
        let h3 = hash_id_at(1_600_000_002);
        let agg_rows = vec![agg_row(&h1, "a1"), agg_row(&h2, "a2")];
        let calendar = CalendarLookup::build(vec![cal_row("a1", "c1")]);

        let assembly = ProofAssembler::new(NetworkMode::Mainnet).assemble_cal_batch(
            &[h1.clone(), h2.clone(), h3.clone()],
            &agg_rows,
            &calendar,
        );

        assert_eq!(assembly.proofs.len(), 1);
        assert_eq!(assembly.proofs[0].hash_id_core, h1);
        assert_eq!(assembly.failures.len(), 2);
        assert!(matches!(assembly.failures[0].error, AssemblyError::MissingCalState { .. }));
        assert_eq!(assembly.failures[1].hash_id, h3);
        assert!(matches!(assembly.failures[1].error, AssemblyError::MissingAggState { .. }));
    }

    #[test]
    fn test_duplicate_hash_ids_assembled_once() {
        let h1 = hash_id_at(1_600_000_000);
        let agg_rows = vec![agg_row(&h1, "a1")];
        let calendar = CalendarLookup::build(vec![cal_row("a1", "c1")]);

        let assembly = ProofAssembler::new(NetworkMode::Mainnet).assemble_cal_batch(
            &[h1.clone(), h1.clone()],
            &agg_rows,
            &calendar,
        );
        assert_eq!(assembly.proofs.len(), 1);
        assert!(assembly.failures.is_empty());
    }

    #[test]
    fn test_btc_batch_nests_bitcoin_branch() {
        let h1 = hash_id_at(1_600_000_000);
        let agg_rows = vec![agg_row(&h1, "a1")];
        let calendar = CalendarLookup::build(vec![cal_row("a1", "c1")]);
        let (anchor_aggs, chains) = btc_lookups("c1");

        let assembly = ProofAssembler::new(NetworkMode::Mainnet).assemble_btc_batch(
            &[h1],
            &agg_rows,
            &calendar,
            &anchor_aggs,
            &chains,
        );

        assert_eq!(assembly.proofs.len(), 1);
        let proof = &assembly.proofs[0];
        assert_eq!(proof.branches.len(), 1);
        assert_eq!(proof.branches[0].ops.len(), 5);
        let btc = &proof.branches[0].branches;
        assert_eq!(btc.len(), 1);
        assert_eq!(
            serde_json::to_value(&btc[0].ops).unwrap(),
            json!([
                {"l": "03"},
                {"r": "04"},
                {"op": "sha-256-x2"},
                {"anchors": [{"type": "btc", "anchor_id": "600000", "uris": ["btc-uri"]}]}
            ])
        );
    }

    #[test]
    fn test_btc_batch_drops_unanchored_calendar() {
        let h1 = hash_id_at(1_600_000_000);
        let h2 = hash_id_at(1_600_000_001);
        let agg_rows = vec![agg_row(&h1, "a1"), agg_row(&h2, "a2")];
        let calendar = CalendarLookup::build(vec![cal_row("a1", "c1"), cal_row("a2", "c2")]);
        let (anchor_aggs, chains) = btc_lookups("c1");

        let assembly = ProofAssembler::new(NetworkMode::Mainnet).assemble_btc_batch(
            &[h1, h2.clone()],
            &agg_rows,
            &calendar,
            &anchor_aggs,
            &chains,
        );
        assert_eq!(assembly.proofs.len(), 1);
        assert_eq!(assembly.failures[0].hash_id, h2);
        assert!(matches!(
            assembly.failures[0].error,
            AssemblyError::MissingAnchorBtcAggState { .. }
        ));
    }
}
