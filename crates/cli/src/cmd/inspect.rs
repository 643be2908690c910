use anyhow::Context;
use clap::Args;
use proofgen_core::{Branch, Op, Proof};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Path to a proof JSON file
    file: PathBuf,
}

/// One line per branch, indented by depth.
pub fn outline(proof: &Proof) -> Vec<String> {
    let mut lines = Vec::new();
    for branch in &proof.branches {
        outline_branch(branch, 0, &mut lines);
    }
    lines
}

fn outline_branch(branch: &Branch, depth: usize, lines: &mut Vec<String>) {
    let anchors: Vec<String> = branch
        .ops
        .iter()
        .filter_map(|op| match op {
            Op::Anchors(anchors) => Some(anchors),
            _ => None,
        })
        .flatten()
        .map(|a| format!("{}:{}", a.anchor_type, a.anchor_id))
        .collect();

    lines.push(format!(
        "{}{} ({} ops) anchors=[{}]",
        "  ".repeat(depth),
        branch.label,
        branch.ops.len(),
        anchors.join(", ")
    ));
    for child in &branch.branches {
        outline_branch(child, depth + 1, lines);
    }
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let document = super::read_json(&args.file)?;
    let proof: Proof = serde_json::from_value(document).context("decoding proof")?;

    println!("hash:                   {}", proof.hash);
    println!("hash_id_node:           {}", proof.hash_id_node);
    println!("hash_submitted_node_at: {}", proof.hash_submitted_node_at);
    println!("hash_id_core:           {}", proof.hash_id_core);
    println!("hash_submitted_core_at: {}", proof.hash_submitted_core_at);
    println!("branches:");
    for line in outline(&proof) {
        println!("  {}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofgen_core::{AnchorRef, AnchorType, HashOp};

    #[test]
    fn test_outline_nests_children() {
        let btc = Branch {
            label: "btc_anchor_branch".to_string(),
            ops: vec![
                Op::Hash(HashOp::Sha256X2),
                Op::anchor(
                    AnchorType::Btc,
                    &AnchorRef {
                        anchor_id: "500000".to_string(),
                        uris: vec![],
                    },
                ),
            ],
            branches: vec![],
        };
        let proof = Proof {
            context: proofgen_core::CHAINPOINT_CONTEXT_V3.to_string(),
            proof_type: proofgen_core::CHAINPOINT_PROOF_TYPE.to_string(),
            hash: "aa".repeat(32),
            hash_id_node: String::new(),
            hash_submitted_node_at: String::new(),
            hash_id_core: String::new(),
            hash_submitted_core_at: String::new(),
            branches: vec![Branch {
                label: "cal_anchor_branch".to_string(),
                ops: vec![Op::Hash(HashOp::Sha256)],
                branches: vec![btc],
            }],
        };

        assert_eq!(
            outline(&proof),
            vec![
                "cal_anchor_branch (1 ops) anchors=[]".to_string(),
                "  btc_anchor_branch (2 ops) anchors=[btc:500000]".to_string(),
            ]
        );
    }
}
