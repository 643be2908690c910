//! Event consumer: turns proof-ready events into stored proofs.
//!
//! Per event: fetch fragments → assemble → validate → store → settle.
//! Settlement follows the failure class:
//! - success (possibly partial) → ack
//! - transport fault → reject, the queue redelivers
//! - unrecoverable state or malformed message → ack, logged as an error

use anyhow::{Context, Result};
use proofgen_assembler::{
    AnchorAggLookup, BatchAssembly, BtcChainLookup, CalendarLookup, ProofAssembler,
    ProofSchemaValidator,
};
use proofgen_core::{BatchType, NetworkMode};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::batch_log::BatchLogger;
use crate::error::ProcessError;
use crate::proof_store::{ProofStore, ValidProof};
use crate::queue::{BatchEvent, Delivery, WorkQueue};
use crate::repository::StateRepository;
use crate::supervisor::ConnectionSlot;

/// What processing one event achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Proofs were generated and written.
    Generated {
        /// Batch type of the event
        batch_type: BatchType,
        /// Distinct hash_ids requested
        requested: usize,
        /// Proofs written to storage
        stored: usize,
        /// hash_ids without a stored proof
        dropped: usize,
    },
    /// Recognised event with nothing to assemble (`eth`).
    Skipped(BatchType),
    /// Unknown message type.
    Unknown(String),
}

/// Consumes the work queue and drives assembly.
#[derive(Clone)]
pub struct PipelineConsumer {
    queue: ConnectionSlot<dyn WorkQueue>,
    repository: StateRepository,
    store: ProofStore,
    assembler: ProofAssembler,
    validator: Arc<ProofSchemaValidator>,
    prefetch: usize,
}

impl PipelineConsumer {
    /// Build a consumer. `prefetch` bounds the events in flight.
    pub fn new(
        queue: ConnectionSlot<dyn WorkQueue>,
        repository: StateRepository,
        store: ProofStore,
        network: NetworkMode,
        prefetch: usize,
    ) -> Result<Self> {
        let validator = ProofSchemaValidator::new().context("Failed to compile proof schema")?;

        Ok(Self {
            queue,
            repository,
            store,
            assembler: ProofAssembler::new(network),
            validator: Arc::new(validator),
            prefetch: prefetch.max(1),
        })
    }

    /// Receive and process events until the queue reports it is closed.
    ///
    /// At most `prefetch` events are unsettled at any time. Waits while the
    /// queue or database is disconnected.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Consumer starting (network: {}, prefetch: {})",
            self.assembler.network(),
            self.prefetch
        );

        let permits = Arc::new(Semaphore::new(self.prefetch));
        let mut tasks = JoinSet::new();

        loop {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .context("Consumer semaphore closed")?;
            self.repository.database().wait().await;
            let queue = self.queue.wait().await;

            let received = queue.receive().await;
            match received {
                Ok(Some(delivery)) => {
                    let consumer = self.clone();
                    tasks.spawn(async move {
                        consumer.handle(queue, delivery).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    info!("Work queue closed, waiting for in-flight events");
                    break;
                }
                Err(e) => {
                    warn!("transport fault: queue receive failed: {:#}", e);
                    self.queue.invalidate(&queue);
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Event task failed: {}", e);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Event task failed: {}", e);
            }
        }

        Ok(())
    }

    /// Process one delivery and settle it.
    pub async fn handle(&self, queue: Arc<dyn WorkQueue>, delivery: Delivery) {
        let tag = delivery.tag;
        let msg_type = delivery.msg_type.clone();
        if delivery.redelivered {
            debug!("[{}] delivery {} is a redelivery", msg_type, tag);
        }

        let result = self.process(&delivery).await;

        let settled = match &result {
            Ok(outcome) => {
                info!("[{}] consume message acked: {:?}", msg_type, outcome);
                queue.ack(tag).await
            }
            Err(e) if e.is_transport() => {
                warn!("[{}] consume message rejected for redelivery: {}", msg_type, e);
                queue.reject(tag).await
            }
            Err(e) => {
                error!("[{}] consume message acked without proofs: {}", msg_type, e);
                queue.ack(tag).await
            }
        };

        if let Err(e) = settled {
            warn!("transport fault: could not settle delivery {}: {:#}", tag, e);
            self.queue.invalidate(&queue);
        }
    }

    /// Process one delivery without settling it.
    pub async fn process(&self, delivery: &Delivery) -> Result<EventOutcome, ProcessError> {
        match BatchEvent::decode(&delivery.msg_type, &delivery.body)? {
            BatchEvent::CalBatch(hash_ids) => self.process_cal_batch(&hash_ids).await,
            BatchEvent::BtcBatch(hash_ids) => self.process_btc_batch(&hash_ids).await,
            BatchEvent::EthPlaceholder => {
                info!("Ethereum anchor proofs are not generated; event ignored");
                Ok(EventOutcome::Skipped(BatchType::Eth))
            }
            BatchEvent::Unknown(tag) => {
                error!("Unknown proof ready type: {}", tag);
                Ok(EventOutcome::Unknown(tag))
            }
        }
    }

    async fn process_cal_batch(&self, hash_ids: &[String]) -> Result<EventOutcome, ProcessError> {
        let agg_rows = self.repository.agg_states(hash_ids).await?;
        let agg_ids = distinct(agg_rows.iter().map(|row| row.agg_id.as_str()));
        let calendar = CalendarLookup::build(self.repository.cal_states(&agg_ids).await?);

        let assembly = self.assembler.assemble_cal_batch(hash_ids, &agg_rows, &calendar);
        self.validate_and_store(BatchType::CalBatch, assembly).await
    }

    async fn process_btc_batch(&self, hash_ids: &[String]) -> Result<EventOutcome, ProcessError> {
        let agg_rows = self.repository.agg_states(hash_ids).await?;
        let agg_ids = distinct(agg_rows.iter().map(|row| row.agg_id.as_str()));
        let calendar = CalendarLookup::build(self.repository.cal_states(&agg_ids).await?);

        let cal_ids = calendar.cal_ids(agg_rows.iter().map(|row| row.agg_id.as_str()));
        let anchor_aggs =
            AnchorAggLookup::build(self.repository.anchor_btc_agg_states(&cal_ids).await?);
        if anchor_aggs.is_empty() {
            return Err(ProcessError::UnrecoverableState(format!(
                "no anchor_btc_agg state for hash_ids {}",
                hash_ids.join(", ")
            )));
        }

        let anchor_btc_agg_ids = anchor_aggs.anchor_btc_agg_ids().to_vec();
        let tx_rows = self.repository.btctx_states(&anchor_btc_agg_ids).await?;
        let btctx_ids = distinct(tx_rows.iter().map(|row| row.btctx_id.as_str()));
        let head_rows = self.repository.btchead_states(&btctx_ids).await?;

        let chains = BtcChainLookup::build(tx_rows, head_rows);
        if chains.is_empty() {
            return Err(ProcessError::UnrecoverableState(format!(
                "no btc tx/head state for anchor_btc_agg_ids {} (hash_ids {})",
                anchor_btc_agg_ids.join(", "),
                hash_ids.join(", ")
            )));
        }
        for id in anchor_btc_agg_ids.iter().filter(|id| !chains.contains(id)) {
            warn!("No btc tx/head state for anchor_btc_agg_id {}; its hash_ids are dropped", id);
        }

        let assembly =
            self.assembler
                .assemble_btc_batch(hash_ids, &agg_rows, &calendar, &anchor_aggs, &chains);
        self.validate_and_store(BatchType::BtcBatch, assembly).await
    }

    async fn validate_and_store(
        &self,
        batch_type: BatchType,
        assembly: BatchAssembly,
    ) -> Result<EventOutcome, ProcessError> {
        for failure in &assembly.failures {
            warn!(hash_id = %failure.hash_id, "Proof not assembled: {}", failure.error);
        }
        let requested = assembly.proofs.len() + assembly.failures.len();

        let mut valid = Vec::with_capacity(assembly.proofs.len());
        let mut submitted = Vec::with_capacity(assembly.proofs.len());
        for proof in assembly.proofs {
            match self.validator.validate(&proof) {
                Ok(document) => {
                    submitted.push(proof.hash_submitted_node_at);
                    valid.push(ValidProof {
                        hash_id: proof.hash_id_core,
                        document,
                    });
                }
                Err(e) => error!(
                    hash_id = %proof.hash_id_core,
                    "Proof {} has an invalid JSON schema: {}",
                    proof.hash_id_core,
                    e
                ),
            }
        }

        let (Some(first), Some(last)) = (submitted.first(), submitted.last()) else {
            info!("[{}] no proofs generated for {} hash_id(s)", batch_type, requested);
            return Ok(EventOutcome::Generated {
                batch_type,
                requested,
                stored: 0,
                dropped: requested,
            });
        };

        let logger = BatchLogger::start(batch_type, valid.len());
        logger.starting(first);
        let outcome = self.store.write_batch(valid).await?;
        logger.complete(last, outcome.written);

        Ok(EventOutcome::Generated {
            batch_type,
            requested,
            stored: outcome.written,
            dropped: requested - outcome.written,
        })
    }
}

/// Distinct values in first-seen order.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryWorkQueue;
    use crate::storage::Storage;
    use proofgen_assembler::{AggStateRow, CalStateRow};
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use uuid::timestamp::context::ContextV1;
    use uuid::{Timestamp, Uuid};

    fn hash_id(secs: u64) -> String {
        let ts = Timestamp::from_unix(&ContextV1::new(0), secs, 0);
        Uuid::new_v1(ts, &[1, 2, 3, 4, 5, 6]).to_string()
    }

    async fn setup() -> (PipelineConsumer, Arc<Storage>, Arc<InMemoryWorkQueue>, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Arc::new(Storage::new_with_path(temp_db.path()).await.unwrap());
        storage.run_migrations().await.unwrap();

        let database = ConnectionSlot::with("database", Arc::clone(&storage));
        let queue = Arc::new(InMemoryWorkQueue::new());
        let queue_handle: Arc<dyn WorkQueue> = queue.clone();

        let consumer = PipelineConsumer::new(
            ConnectionSlot::with("queue", queue_handle),
            StateRepository::new(database.clone(), None),
            ProofStore::new(database, Duration::from_secs(3600)),
            NetworkMode::Mainnet,
            1,
        )
        .unwrap();
        (consumer, storage, queue, temp_db)
    }

    fn delivery(msg_type: &str, body: &str) -> Delivery {
        Delivery {
            tag: 0,
            msg_type: msg_type.to_string(),
            body: body.as_bytes().to_vec(),
            redelivered: false,
        }
    }

    #[test]
    fn test_distinct_keeps_order() {
        assert_eq!(distinct(["b", "a", "b", "c"].into_iter()), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_cal_batch_stores_proof() {
        let (consumer, storage, _queue, _temp_db) = setup().await;
        let h1 = hash_id(1_600_000_000);
        storage
            .put_agg_state(&AggStateRow {
                hash_id: h1.clone(),
                hash: "ab".repeat(32),
                agg_id: "a1".to_string(),
                agg_state: r#"{"ops":[{"op":"sha-256"}]}"#.to_string(),
            })
            .await
            .unwrap();
        storage
            .put_cal_state(&CalStateRow {
                agg_id: "a1".to_string(),
                cal_id: "c1".to_string(),
                cal_state: r#"{"ops":[],"anchor":{"anchor_id":"c1","uris":["uri1"]}}"#.to_string(),
            })
            .await
            .unwrap();

        let body = format!(r#"{{"hash_ids":["{}"]}}"#, h1);
        let outcome = consumer.process(&delivery("cal_batch", &body)).await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Generated {
                batch_type: BatchType::CalBatch,
                requested: 1,
                stored: 1,
                dropped: 0
            }
        );
        assert!(storage.get_proof(&h1).await.unwrap().is_some());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_btc_batch_without_anchor_state_is_unrecoverable() {
        let (consumer, storage, _queue, _temp_db) = setup().await;

        let outcome = consumer
            .process(&delivery("btc_batch", r#"{"hash_ids":["h1"]}"#))
            .await;
        assert!(matches!(outcome, Err(ProcessError::UnrecoverableState(_))));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_eth_and_unknown_are_acked() {
        let (consumer, storage, queue, _temp_db) = setup().await;
        queue.publish("eth", "{}");
        queue.publish("anchor_ltc", "{}");
        queue.publish("cal_batch", "not json");
        queue.close();

        consumer.run().await.unwrap();
        assert_eq!(queue.acked_count(), 3);
        assert_eq!(queue.rejected_count(), 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_transport_fault_rejects() {
        let (consumer, storage, queue, _temp_db) = setup().await;
        queue.publish("cal_batch", r#"{"hash_ids":["h1"]}"#);

        let handle: Arc<dyn WorkQueue> = queue.clone();
        let delivery = queue.receive().await.unwrap().unwrap();
        storage.close().await;
        consumer.handle(handle, delivery).await;

        assert_eq!(queue.rejected_count(), 1);
        assert_eq!(queue.ready_count(), 1);
    }

    #[tokio::test]
    async fn test_locked_database_rejects() {
        let (consumer, storage, queue, temp_db) = setup().await;
        queue.publish("cal_batch", r#"{"hash_ids":["h1"]}"#);

        // A second pool holds an exclusive lock on the same file.
        let other = Storage::new_with_path(temp_db.path()).await.unwrap();
        let mut conn = other.pool().acquire().await.unwrap();
        sqlx::query("BEGIN EXCLUSIVE").execute(&mut *conn).await.unwrap();

        let handle: Arc<dyn WorkQueue> = queue.clone();
        let delivery = queue.receive().await.unwrap().unwrap();
        let outcome = consumer.process(&delivery).await;
        assert!(matches!(outcome, Err(ProcessError::Transport(_))));

        consumer.handle(handle, delivery).await;
        assert_eq!(queue.rejected_count(), 1);
        assert_eq!(queue.acked_count(), 0);
        assert_eq!(queue.ready_count(), 1);

        sqlx::query("ROLLBACK").execute(&mut *conn).await.unwrap();
        drop(conn);
        other.close().await;
        storage.close().await;
    }
}
