//! Periodic proof expiry.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::proof_store::ProofStore;

/// Runs [`ProofStore::prune_expired`] at a fixed interval, independent of
/// message traffic.
#[derive(Debug, Clone)]
pub struct ProofPruner {
    store: ProofStore,
    interval: Duration,
}

impl ProofPruner {
    /// Pruner sweeping `store` every `interval`.
    pub fn new(store: ProofStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run the sweep loop forever.
    ///
    /// The first sweep happens one interval after start. A failed sweep is
    /// logged and the loop continues.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Proof pruner starting (interval: {:?}, retention: {:?})",
            self.interval,
            self.store.retention()
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // First tick completes immediately, skip it

        loop {
            interval.tick().await;

            if let Err(e) = self.prune_now().await {
                warn!("Unable to complete pruning process: {:#}", e);
            }
        }
    }

    /// One sweep. Returns the number of proofs deleted.
    pub async fn prune_now(&self) -> Result<u64> {
        let deleted = self.store.prune_expired().await?;
        if deleted > 0 {
            info!("Pruning proofs: {} row(s) deleted", deleted);
        }
        Ok(deleted)
    }
}
