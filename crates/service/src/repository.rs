//! Cache-first lookup of fragment rows.
//!
//! Each call is one batched lookup for one fragment table. The cache is
//! consulted first; misses go to the database and are written back to the
//! cache best-effort. A missing key is never an error, callers check
//! completeness themselves.

use proofgen_assembler::{
    AggStateRow, AnchorBtcAggStateRow, BtcHeadStateRow, BtcTxStateRow, CalStateRow, FragmentRow,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::cache::StateCache;
use crate::error::{is_connection_anyhow, ProcessError};
use crate::storage::Storage;
use crate::supervisor::ConnectionSlot;

/// Read-only access to the fragment tables.
#[derive(Debug, Clone)]
pub struct StateRepository {
    database: ConnectionSlot<Storage>,
    cache: Option<ConnectionSlot<dyn StateCache>>,
}

impl StateRepository {
    /// Repository over `database`, with an optional cache in front.
    pub fn new(database: ConnectionSlot<Storage>, cache: Option<ConnectionSlot<dyn StateCache>>) -> Self {
        Self { database, cache }
    }

    /// Database slot the repository reads from.
    pub fn database(&self) -> &ConnectionSlot<Storage> {
        &self.database
    }

    /// Aggregation states by hash_id.
    pub async fn agg_states(&self, hash_ids: &[String]) -> Result<Vec<AggStateRow>, ProcessError> {
        self.fetch(hash_ids, |storage, keys| async move { storage.get_agg_states(&keys).await })
            .await
    }

    /// Calendar states by agg_id.
    pub async fn cal_states(&self, agg_ids: &[String]) -> Result<Vec<CalStateRow>, ProcessError> {
        self.fetch(agg_ids, |storage, keys| async move { storage.get_cal_states(&keys).await })
            .await
    }

    /// Bitcoin anchor aggregation states by cal_id.
    pub async fn anchor_btc_agg_states(
        &self,
        cal_ids: &[String],
    ) -> Result<Vec<AnchorBtcAggStateRow>, ProcessError> {
        self.fetch(cal_ids, |storage, keys| async move {
            storage.get_anchor_btc_agg_states(&keys).await
        })
        .await
    }

    /// Bitcoin transaction states by anchor_btc_agg_id.
    pub async fn btctx_states(
        &self,
        anchor_btc_agg_ids: &[String],
    ) -> Result<Vec<BtcTxStateRow>, ProcessError> {
        self.fetch(anchor_btc_agg_ids, |storage, keys| async move {
            storage.get_btctx_states(&keys).await
        })
        .await
    }

    /// Bitcoin head states by btctx_id.
    pub async fn btchead_states(&self, btctx_ids: &[String]) -> Result<Vec<BtcHeadStateRow>, ProcessError> {
        self.fetch(btctx_ids, |storage, keys| async move {
            storage.get_btchead_states(&keys).await
        })
        .await
    }

    async fn fetch<R, F, Fut>(&self, keys: &[String], load: F) -> Result<Vec<R>, ProcessError>
    where
        R: FragmentRow,
        F: FnOnce(Arc<Storage>, Vec<String>) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<R>>>,
    {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys.iter().filter(|k| seen.insert(k.as_str())).cloned().collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let (mut rows, misses) = self.from_cache::<R>(&keys).await;
        if misses.is_empty() {
            return Ok(rows);
        }

        let storage = self
            .database
            .current()
            .ok_or_else(|| ProcessError::Transport("database not connected".to_string()))?;

        let loaded = match load(Arc::clone(&storage), misses).await {
            Ok(loaded) => loaded,
            // A lookup never fails because a key is missing, so any error
            // here is worth a redelivery.
            Err(e) => {
                if is_connection_anyhow(&e) {
                    self.database.invalidate(&storage);
                }
                return Err(ProcessError::Transport(format!("{:#}", e)));
            }
        };

        self.write_back(&loaded).await;
        rows.extend(loaded);
        Ok(rows)
    }

    /// Rows found in the cache, and the keys that were not.
    async fn from_cache<R: FragmentRow>(&self, keys: &[String]) -> (Vec<R>, Vec<String>) {
        let Some(cache) = self.cache.as_ref().and_then(ConnectionSlot::current) else {
            return (Vec::new(), keys.to_vec());
        };

        let cached = match cache.get_many(R::KIND, keys).await {
            Ok(cached) => cached,
            Err(e) => {
                debug!("Cache read failed for {} states, using database: {:#}", R::KIND, e);
                return (Vec::new(), keys.to_vec());
            }
        };

        let mut rows = Vec::with_capacity(cached.len());
        let mut misses = Vec::new();
        for key in keys {
            match cached.get(key).and_then(|raw| serde_json::from_str::<R>(raw).ok()) {
                Some(row) => rows.push(row),
                None => misses.push(key.clone()),
            }
        }
        (rows, misses)
    }

    async fn write_back<R: FragmentRow>(&self, rows: &[R]) {
        if rows.is_empty() {
            return;
        }
        let Some(cache) = self.cache.as_ref().and_then(ConnectionSlot::current) else {
            return;
        };

        let entries: Vec<(String, String)> = rows
            .iter()
            .filter_map(|row| {
                serde_json::to_string(row)
                    .ok()
                    .map(|raw| (row.key().to_string(), raw))
            })
            .collect();
        if let Err(e) = cache.put_many(R::KIND, entries).await {
            debug!("Cache write-back failed for {} states: {:#}", R::KIND, e);
        }
    }
}
