//! Chainpoint v3 schema gate.
//!
//! Every assembled proof is validated before it may be stored. Validation
//! runs in two phases:
//! 1. Branch nesting depth pre-check
//! 2. JSON Schema validation against the embedded draft-07 schema

use proofgen_core::Proof;
use serde_json::Value;
use thiserror::Error;

/// The published Chainpoint v3 proof schema.
pub const CHAINPOINT_V3_SCHEMA: &str = include_str!("../schema/chainpoint-v3.json");

/// Deepest branch nesting accepted (calendar → Bitcoin is 2).
pub const MAX_BRANCH_DEPTH: usize = 3;

/// Schema gate failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The embedded schema failed to compile.
    #[error("invalid proof schema: {message}")]
    InvalidSchema {
        /// Compiler message.
        message: String,
    },

    /// The proof could not be turned into JSON.
    #[error("proof serialization failed: {0}")]
    Serialize(String),

    /// Branches nest deeper than [`MAX_BRANCH_DEPTH`].
    #[error("branch nesting depth {depth} exceeds maximum {max}")]
    DepthExceeded {
        /// Depth found.
        depth: usize,
        /// Allowed depth.
        max: usize,
    },

    /// The proof violates the schema.
    #[error("proof does not match schema: {}", .errors.join("; "))]
    Invalid {
        /// One message per violation.
        errors: Vec<String>,
    },
}

/// Compiled proof schema.
#[derive(Debug)]
pub struct ProofSchemaValidator {
    validator: jsonschema::Validator,
}

impl ProofSchemaValidator {
    /// Compile the embedded Chainpoint v3 schema.
    pub fn new() -> Result<Self, SchemaError> {
        let schema: Value =
            serde_json::from_str(CHAINPOINT_V3_SCHEMA).map_err(|e| SchemaError::InvalidSchema {
                message: e.to_string(),
            })?;

        let validator = jsonschema::options()
            .with_draft(jsonschema::Draft::Draft7)
            .build(&schema)
            .map_err(|e| SchemaError::InvalidSchema {
                message: e.to_string(),
            })?;

        Ok(Self { validator })
    }

    /// Validate a proof document already in JSON form.
    pub fn validate_value(&self, value: &Value) -> Result<(), SchemaError> {
        let depth = branch_depth(value);
        if depth > MAX_BRANCH_DEPTH {
            return Err(SchemaError::DepthExceeded {
                depth,
                max: MAX_BRANCH_DEPTH,
            });
        }

        let errors: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid { errors })
        }
    }

    /// Validate a proof, returning the JSON document that passed.
    pub fn validate(&self, proof: &Proof) -> Result<Value, SchemaError> {
        let value = serde_json::to_value(proof).map_err(|e| SchemaError::Serialize(e.to_string()))?;
        self.validate_value(&value)?;
        Ok(value)
    }
}

/// Deepest chain of nested `branches` arrays.
fn branch_depth(value: &Value) -> usize {
    match value.get("branches").and_then(Value::as_array) {
        Some(children) => 1 + children.iter().map(branch_depth).max().unwrap_or(0),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_proof() -> Value {
        json!({
            "@context": "https://w3id.org/chainpoint/v3",
            "type": "Chainpoint",
            "hash": "ab".repeat(32),
            "hash_id_node": "7fbb4e60-0d6a-11e9-8000-010203040506",
            "hash_submitted_node_at": "2019-01-01T00:00:00Z",
            "hash_id_core": "7fbb4e60-0d6a-11e9-8000-010203040506",
            "hash_submitted_core_at": "2019-01-01T00:00:00Z",
            "branches": [{
                "label": "cal_anchor_branch",
                "ops": [
                    {"l": "op1"},
                    {"op": "sha-256"},
                    {"anchors": [{"type": "tcal", "anchor_id": "c1", "uris": ["uri1"]}]}
                ],
                "branches": [{
                    "label": "btc_anchor_branch",
                    "ops": [
                        {"op": "sha-256-x2"},
                        {"anchors": [{"type": "tbtc", "anchor_id": "600000", "uris": []}]}
                    ]
                }]
            }]
        })
    }

    #[test]
    fn test_valid_proof_passes() {
        let validator = ProofSchemaValidator::new().unwrap();
        validator.validate_value(&valid_proof()).unwrap();
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let validator = ProofSchemaValidator::new().unwrap();
        for field in ["@context", "type", "hash", "branches"] {
            let mut proof = valid_proof();
            proof.as_object_mut().unwrap().remove(field);
            let err = validator.validate_value(&proof).unwrap_err();
            assert!(matches!(err, SchemaError::Invalid { .. }), "field {}", field);
        }
    }

    #[test]
    fn test_empty_branches_rejected() {
        let validator = ProofSchemaValidator::new().unwrap();
        let mut proof = valid_proof();
        proof["branches"] = json!([]);
        assert!(validator.validate_value(&proof).is_err());
    }

    #[test]
    fn test_bad_op_shape_rejected() {
        let validator = ProofSchemaValidator::new().unwrap();
        let mut proof = valid_proof();
        proof["branches"][0]["ops"][0] = json!({"l": "a", "r": "b"});
        assert!(validator.validate_value(&proof).is_err());

        let mut proof = valid_proof();
        proof["branches"][0]["ops"][1] = json!({"op": "md5"});
        assert!(validator.validate_value(&proof).is_err());
    }

    #[test]
    fn test_fractional_timestamp_rejected() {
        let validator = ProofSchemaValidator::new().unwrap();
        let mut proof = valid_proof();
        proof["hash_submitted_core_at"] = json!("2019-01-01T00:00:00.123Z");
        assert!(validator.validate_value(&proof).is_err());
    }

    #[test]
    fn test_depth_precheck() {
        let validator = ProofSchemaValidator::new().unwrap();
        let mut proof = valid_proof();
        let leaf = json!({"label": "x", "ops": [{"op": "sha-256"}]});
        let level3 = json!({"label": "x", "ops": [{"op": "sha-256"}], "branches": [leaf]});
        proof["branches"][0]["branches"][0]["branches"] = json!([level3]);
        assert!(matches!(
            validator.validate_value(&proof),
            Err(SchemaError::DepthExceeded { depth: 4, max: 3 })
        ));
    }
}
