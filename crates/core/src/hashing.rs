//! Proof evaluation.
//!
//! Applies the ops of every branch to the submitted hash and reports, for
//! each anchor op met on the way, the value that the anchored ledger must
//! contain for the proof to be valid.

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};

use crate::error::{CoreError, Result};
use crate::types::{Anchor, Branch, HashOp, Op, Proof};

/// An anchor together with the value it must commit to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorValue {
    /// Label of the branch the anchor closes.
    pub branch: String,
    /// The anchor itself.
    pub anchor: Anchor,
    /// Expected anchored value, hex encoded.
    ///
    /// Bitcoin anchors are byte-reversed to match the block header merkle
    /// root as displayed by block explorers.
    pub expected_value: String,
}

/// Apply a hash op to `input`.
pub fn apply_hash(op: HashOp, input: &[u8]) -> Vec<u8> {
    match op {
        HashOp::Sha224 => Sha224::digest(input).to_vec(),
        HashOp::Sha256 => Sha256::digest(input).to_vec(),
        HashOp::Sha384 => Sha384::digest(input).to_vec(),
        HashOp::Sha512 => Sha512::digest(input).to_vec(),
        HashOp::Sha3_224 => Sha3_224::digest(input).to_vec(),
        HashOp::Sha3_256 => Sha3_256::digest(input).to_vec(),
        HashOp::Sha3_384 => Sha3_384::digest(input).to_vec(),
        HashOp::Sha3_512 => Sha3_512::digest(input).to_vec(),
        HashOp::Sha256X2 => Sha256::digest(Sha256::digest(input)).to_vec(),
    }
}

/// Decode an `l`/`r` operand.
///
/// Hex operands are decoded; anything else (e.g. node or core identifiers
/// mixed into the tree) is taken as its UTF-8 bytes.
fn operand_bytes(value: &str) -> Vec<u8> {
    match hex::decode(value) {
        Ok(bytes) if !value.is_empty() => bytes,
        _ => value.as_bytes().to_vec(),
    }
}

/// Evaluate every branch of `proof`, returning the anchors in traversal order.
///
/// # Errors
///
/// Returns [`CoreError::InvalidHex`] if the proof `hash` is not hex.
pub fn evaluate_proof(proof: &Proof) -> Result<Vec<AnchorValue>> {
    let start = hex::decode(&proof.hash).map_err(|e| CoreError::InvalidHex(e.to_string()))?;

    let mut out = Vec::new();
    for branch in &proof.branches {
        evaluate_branch(&start, branch, &mut out);
    }
    Ok(out)
}

/// Apply `ops` to `start`.
///
/// Returns the final value and, for every anchor op met, the anchor with the
/// hex value it commits to.
pub fn evaluate_ops(start: &[u8], ops: &[Op]) -> (Vec<u8>, Vec<(Anchor, String)>) {
    let mut current = start.to_vec();
    let mut anchored = Vec::new();

    for op in ops {
        match op {
            Op::Left(value) => {
                let mut joined = operand_bytes(value);
                joined.extend_from_slice(&current);
                current = joined;
            }
            Op::Right(value) => current.extend_from_slice(&operand_bytes(value)),
            Op::Hash(hash_op) => current = apply_hash(*hash_op, &current),
            Op::Anchors(anchors) => {
                for anchor in anchors {
                    let mut value = current.clone();
                    if anchor.anchor_type.is_bitcoin() {
                        value.reverse();
                    }
                    anchored.push((anchor.clone(), hex::encode(value)));
                }
            }
        }
    }

    (current, anchored)
}

/// Evaluate one branch starting from `start`; children continue from its final value.
fn evaluate_branch(start: &[u8], branch: &Branch, out: &mut Vec<AnchorValue>) {
    let (current, anchored) = evaluate_ops(start, &branch.ops);
    out.extend(anchored.into_iter().map(|(anchor, expected_value)| AnchorValue {
        branch: branch.label.clone(),
        anchor,
        expected_value,
    }));

    for child in &branch.branches {
        evaluate_branch(&current, child, out);
    }
}
