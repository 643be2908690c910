//! Durable, idempotent proof persistence and expiry.

use anyhow::{Context, Result};
use proofgen_core::Proof;
use serde_json::Value;
use std::time::Duration;
use tracing::error;

use crate::error::{is_connection_anyhow, is_transport_anyhow, ProcessError};
use crate::storage::{ProofRecord, Storage, MAX_KEYS_PER_QUERY};
use crate::supervisor::ConnectionSlot;

/// A proof that passed the schema gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidProof {
    /// hash_id the proof is for
    pub hash_id: String,
    /// Validated proof document
    pub document: Value,
}

/// Result of one bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Proofs written
    pub written: usize,
    /// Proofs in chunks that failed
    pub failed: usize,
}

/// Writes proofs and sweeps expired ones.
#[derive(Debug, Clone)]
pub struct ProofStore {
    database: ConnectionSlot<Storage>,
    retention: Duration,
}

impl ProofStore {
    /// Store over `database`, keeping proofs for `retention`.
    pub fn new(database: ConnectionSlot<Storage>, retention: Duration) -> Self {
        Self { database, retention }
    }

    /// Retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Upsert proofs in chunks.
    ///
    /// A chunk that fails for a data reason is logged and counted in
    /// [`WriteOutcome::failed`]; chunks already written stay written. A
    /// transport fault stops the write and is returned, since upserts make a
    /// full redelivery safe.
    pub async fn write_batch(&self, proofs: Vec<ValidProof>) -> Result<WriteOutcome, ProcessError> {
        let mut outcome = WriteOutcome::default();
        if proofs.is_empty() {
            return Ok(outcome);
        }

        let storage = self
            .database
            .current()
            .ok_or_else(|| ProcessError::Transport("database not connected".to_string()))?;

        let created_at = chrono::Utc::now().timestamp();
        let mut records = Vec::with_capacity(proofs.len());
        for proof in proofs {
            match serde_json::to_string(&proof.document) {
                Ok(text) => records.push(ProofRecord {
                    hash_id: proof.hash_id,
                    proof: text,
                    created_at,
                }),
                Err(e) => {
                    error!(hash_id = %proof.hash_id, "Could not serialize proof: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        for chunk in records.chunks(MAX_KEYS_PER_QUERY) {
            match storage.upsert_proofs(chunk).await {
                Ok(_) => outcome.written += chunk.len(),
                Err(e) if is_transport_anyhow(&e) => {
                    if is_connection_anyhow(&e) {
                        self.database.invalidate(&storage);
                    }
                    return Err(ProcessError::from_storage(e));
                }
                Err(e) => {
                    error!(
                        first_hash_id = %chunk[0].hash_id,
                        count = chunk.len(),
                        "Could not save proofs to local database: {:#}",
                        e
                    );
                    outcome.failed += chunk.len();
                }
            }
        }

        Ok(outcome)
    }

    /// Delete proofs older than the retention window. Returns the count deleted.
    pub async fn prune_expired(&self) -> Result<u64> {
        let storage = self.storage()?;
        let cutoff = chrono::Utc::now().timestamp() - self.retention.as_secs() as i64;
        let deleted = match storage.delete_proofs_created_before(cutoff).await {
            Ok(deleted) => deleted,
            Err(e) => {
                if is_connection_anyhow(&e) {
                    self.database.invalidate(&storage);
                }
                return Err(e);
            }
        };
        Ok(deleted)
    }

    /// Stored proof for `hash_id`.
    pub async fn get_proof(&self, hash_id: &str) -> Result<Option<Proof>> {
        let storage = self.storage()?;
        storage
            .get_proof(hash_id)
            .await?
            .map(|record| parse_record(&record))
            .transpose()
    }

    /// Stored proofs for `hash_ids`; missing ones are absent.
    pub async fn get_proofs(&self, hash_ids: &[String]) -> Result<Vec<Proof>> {
        let storage = self.storage()?;
        storage
            .get_proofs(hash_ids)
            .await?
            .iter()
            .map(parse_record)
            .collect()
    }

    /// Number of stored proofs.
    pub async fn count_proofs(&self) -> Result<u64> {
        self.storage()?.count_proofs().await
    }

    fn storage(&self) -> Result<std::sync::Arc<Storage>> {
        self.database
            .current()
            .context("Database not connected")
    }
}

fn parse_record(record: &ProofRecord) -> Result<Proof> {
    serde_json::from_str(&record.proof)
        .with_context(|| format!("Stored proof for {} is not a valid proof", record.hash_id))
}
