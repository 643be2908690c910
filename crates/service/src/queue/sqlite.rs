//! Durable work queue backed by the service database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{Delivery, WorkQueue};
use crate::storage::Storage;

/// Work queue stored in the `work_queue` table.
///
/// Claims survive only as long as the process: connecting releases every
/// claim left behind, so unsettled deliveries are redelivered after a crash
/// or reconnect.
#[derive(Debug, Clone)]
pub struct SqliteWorkQueue {
    storage: Storage,
    queue: String,
    poll_interval: Duration,
}

impl SqliteWorkQueue {
    /// Open `queue`, releasing stale claims.
    pub async fn connect(storage: Storage, queue: &str, poll_interval: Duration) -> Result<Self> {
        let released = storage
            .release_stale_claims(queue)
            .await
            .context("Failed to open work queue")?;
        if released > 0 {
            info!("Work queue {}: {} unsettled message(s) returned for redelivery", queue, released);
        }

        Ok(Self {
            storage,
            queue: queue.to_string(),
            poll_interval,
        })
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.queue
    }

    /// Publish a message.
    pub async fn enqueue(&self, msg_type: &str, body: &str) -> Result<i64> {
        self.storage.enqueue_message(&self.queue, msg_type, body).await
    }

    /// Messages not yet acknowledged.
    pub async fn depth(&self) -> Result<u64> {
        self.storage.queue_depth(&self.queue).await
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn receive(&self) -> Result<Option<Delivery>> {
        loop {
            if let Some(message) = self.storage.claim_next_message(&self.queue).await? {
                debug!("Claimed message {} [{}]", message.id, message.msg_type);
                return Ok(Some(Delivery {
                    tag: message.id as u64,
                    msg_type: message.msg_type,
                    body: message.body.into_bytes(),
                    redelivered: message.attempts > 0,
                }));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        self.storage.delete_message(tag as i64).await
    }

    async fn reject(&self, tag: u64) -> Result<()> {
        self.storage.release_message(tag as i64).await
    }
}
