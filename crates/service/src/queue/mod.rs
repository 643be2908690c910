//! Inbound work queue.
//!
//! The consumer only sees the [`WorkQueue`] trait: receive a delivery, then
//! settle it with `ack` (done, never redeliver) or `reject` (requeue).

use anyhow::Result;
use async_trait::async_trait;

pub mod memory;
pub mod message;
pub mod sqlite;

pub use memory::InMemoryWorkQueue;
pub use message::BatchEvent;
pub use sqlite::SqliteWorkQueue;

/// One message handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag used to settle the delivery
    pub tag: u64,
    /// Message type tag (`cal_batch`, `btc_batch`, `eth`, ...)
    pub msg_type: String,
    /// Raw body
    pub body: Vec<u8>,
    /// True if this message was delivered before without an ack
    pub redelivered: bool,
}

/// A queue of proof-ready events with at-least-once delivery.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Wait for the next delivery. `None` once the queue is closed and drained.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Settle a delivery as done.
    async fn ack(&self, tag: u64) -> Result<()>;

    /// Settle a delivery as failed; it will be delivered again.
    async fn reject(&self, tag: u64) -> Result<()>;
}
