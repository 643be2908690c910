//! Work queue table operations.
//!
//! A message is claimed by stamping `claimed_at`. Acknowledging deletes it;
//! releasing clears the stamp and counts the attempt.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::Storage;

/// A claimed queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Row id, used as the delivery tag
    pub id: i64,
    /// Message type tag
    pub msg_type: String,
    /// UTF-8 JSON body
    pub body: String,
    /// Earlier deliveries that were not acknowledged
    pub attempts: i64,
}

impl Storage {
    /// Append a message to `queue`. Returns its id.
    pub async fn enqueue_message(&self, queue: &str, msg_type: &str, body: &str) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO work_queue (queue, msg_type, body, enqueued_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(queue)
        .bind(msg_type)
        .bind(body)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to enqueue message")?;

        Ok(result.last_insert_rowid())
    }

    /// Claim the oldest unclaimed message of `queue`.
    pub async fn claim_next_message(&self, queue: &str) -> Result<Option<QueuedMessage>> {
        let row = sqlx::query(
            r#"
            UPDATE work_queue
            SET claimed_at = ?
            WHERE id = (
                SELECT id FROM work_queue
                WHERE queue = ? AND claimed_at IS NULL
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, msg_type, body, attempts
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim queue message")?;

        row.map(row_to_message).transpose()
    }

    /// Delete an acknowledged message.
    pub async fn delete_message(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM work_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete queue message")?;
        Ok(())
    }

    /// Return a rejected message to the queue.
    pub async fn release_message(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE work_queue SET claimed_at = NULL, attempts = attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to release queue message")?;
        Ok(())
    }

    /// Release every claim on `queue` left by a previous process.
    pub async fn release_stale_claims(&self, queue: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE work_queue
            SET claimed_at = NULL, attempts = attempts + 1
            WHERE queue = ? AND claimed_at IS NOT NULL
            "#,
        )
        .bind(queue)
        .execute(&self.pool)
        .await
        .context("Failed to release stale claims")?;
        Ok(result.rows_affected())
    }

    /// Messages of `queue` not yet acknowledged.
    pub async fn queue_depth(&self, queue: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_queue WHERE queue = ?")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count queue messages")?;
        Ok(count as u64)
    }
}

fn row_to_message(row: SqliteRow) -> Result<QueuedMessage> {
    Ok(QueuedMessage {
        id: row.try_get("id")?,
        msg_type: row.try_get("msg_type")?,
        body: row.try_get("body")?,
        attempts: row.try_get("attempts")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_claim_release_delete() {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
        storage.run_migrations().await.unwrap();

        let id = storage.enqueue_message("work.gen", "cal_batch", "{}").await.unwrap();
        storage.enqueue_message("other", "cal_batch", "{}").await.unwrap();

        let claimed = storage.claim_next_message("work.gen").await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.attempts, 0);
        assert!(storage.claim_next_message("work.gen").await.unwrap().is_none());

        storage.release_message(id).await.unwrap();
        let again = storage.claim_next_message("work.gen").await.unwrap().unwrap();
        assert_eq!(again.attempts, 1);

        storage.delete_message(id).await.unwrap();
        assert_eq!(storage.queue_depth("work.gen").await.unwrap(), 0);
        assert_eq!(storage.queue_depth("other").await.unwrap(), 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path()).await.unwrap();
        storage.run_migrations().await.unwrap();

        storage.enqueue_message("work.gen", "btc_batch", "{}").await.unwrap();
        storage.claim_next_message("work.gen").await.unwrap().unwrap();

        assert_eq!(storage.release_stale_claims("work.gen").await.unwrap(), 1);
        let redelivered = storage.claim_next_message("work.gen").await.unwrap().unwrap();
        assert_eq!(redelivered.attempts, 1);

        storage.close().await;
    }
}
