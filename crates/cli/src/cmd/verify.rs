use anyhow::Context;
use clap::Args;
use proofgen_assembler::ProofSchemaValidator;
use proofgen_core::{evaluate_proof, AnchorValue, Proof};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Path to a proof JSON file
    file: PathBuf,
    /// Print the anchors as JSON
    #[arg(long)]
    json: bool,
}

/// Validate `document` and evaluate its ops down to the anchored values.
pub fn verify_document(document: &serde_json::Value) -> anyhow::Result<Vec<AnchorValue>> {
    let validator = ProofSchemaValidator::new()?;
    validator.validate_value(document)?;

    let proof: Proof = serde_json::from_value(document.clone()).context("decoding proof")?;
    Ok(evaluate_proof(&proof)?)
}

pub fn run(args: VerifyArgs) -> anyhow::Result<()> {
    let document = super::read_json(&args.file)?;
    let anchors = verify_document(&document)?;

    if args.json {
        let out: Vec<_> = anchors
            .iter()
            .map(|a| {
                serde_json::json!({
                    "branch": a.branch,
                    "type": a.anchor.anchor_type.as_str(),
                    "anchor_id": a.anchor.anchor_id,
                    "expected_value": a.expected_value,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("OK: schema valid, {} anchor(s)", anchors.len());
    for a in &anchors {
        println!(
            "  {} {} {} -> {}",
            a.branch, a.anchor.anchor_type, a.anchor.anchor_id, a.expected_value
        );
    }
    Ok(())
}
