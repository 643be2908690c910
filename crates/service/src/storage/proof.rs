//! Proof table operations.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{Storage, MAX_KEYS_PER_QUERY};

/// A stored proof document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRecord {
    /// hash_id the proof is for
    pub hash_id: String,
    /// Proof JSON text
    pub proof: String,
    /// Write time (Unix seconds)
    pub created_at: i64,
}

impl Storage {
    /// Insert or replace proofs in one transaction.
    ///
    /// A hash_id that already has a proof is overwritten, so replaying the
    /// same records never creates duplicates. Returns the number of rows
    /// written.
    pub async fn upsert_proofs(&self, records: &[ProofRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("Failed to begin proof transaction")?;
        let mut written = 0;

        for chunk in records.chunks(MAX_KEYS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO proofs (hash_id, proof, created_at) ");
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.hash_id.as_str())
                    .push_bind(record.proof.as_str())
                    .push_bind(record.created_at);
            });
            builder.push(
                " ON CONFLICT(hash_id) DO UPDATE SET proof = excluded.proof, created_at = excluded.created_at",
            );

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to upsert proofs")?;
            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit proofs")?;

        Ok(written)
    }

    /// Proof for one hash_id.
    pub async fn get_proof(&self, hash_id: &str) -> Result<Option<ProofRecord>> {
        let row = sqlx::query("SELECT hash_id, proof, created_at FROM proofs WHERE hash_id = ?")
            .bind(hash_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch proof")?;

        row.map(row_to_proof).transpose()
    }

    /// Proofs for many hash_ids; missing ones are absent.
    pub async fn get_proofs(&self, hash_ids: &[String]) -> Result<Vec<ProofRecord>> {
        let mut out = Vec::with_capacity(hash_ids.len());

        for chunk in hash_ids.chunks(MAX_KEYS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT hash_id, proof, created_at FROM proofs WHERE hash_id IN (");
            let mut separated = builder.separated(", ");
            for hash_id in chunk {
                separated.push_bind(hash_id.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch proofs")?;
            for row in rows {
                out.push(row_to_proof(row)?);
            }
        }

        Ok(out)
    }

    /// Number of stored proofs.
    pub async fn count_proofs(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proofs")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count proofs")?;
        Ok(count as u64)
    }

    /// Delete proofs written before `cutoff` (Unix seconds).
    pub async fn delete_proofs_created_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM proofs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to delete expired proofs")?;
        Ok(result.rows_affected())
    }
}

fn row_to_proof(row: SqliteRow) -> Result<ProofRecord> {
    Ok(ProofRecord {
        hash_id: row.try_get("hash_id")?,
        proof: row.try_get("proof")?,
        created_at: row.try_get("created_at")?,
    })
}
