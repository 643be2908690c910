//! Storage layer for the proof generation service.
//!
//! This module provides database operations for:
//! - Fragment state tables (read by assembly, written by upstream stages)
//! - Assembled proofs (upsert, lookup, expiry)
//! - The durable work queue

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod proof;
pub mod queue;
pub mod state;

pub use proof::ProofRecord;
pub use queue::QueuedMessage;

/// Largest number of keys bound into one `IN (...)` list or multi-row insert.
pub const MAX_KEYS_PER_QUERY: usize = 500;

/// Database storage for the service.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Connect to `database_url` with the given pool bounds.
    ///
    /// The database file is created if it doesn't exist. Migrations are not
    /// run; call [`Storage::run_migrations`].
    ///
    /// # Example
    /// ```no_run
    /// # use proofgen_service::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://proofgen.db", 5, 1).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Open a database file with default pool bounds.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, 5, 1).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// True once the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Row counts per table.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let mut counts = [0u64; 6];
        let tables = [
            "agg_states",
            "cal_states",
            "anchor_btc_agg_states",
            "btctx_states",
            "btchead_states",
            "work_queue",
        ];
        for (count, table) in counts.iter_mut().zip(tables) {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("Failed to count {}", table))?;
            *count = n as u64;
        }

        Ok(DatabaseStats {
            agg_state_count: counts[0],
            cal_state_count: counts[1],
            anchor_btc_agg_state_count: counts[2],
            btctx_state_count: counts[3],
            btchead_state_count: counts[4],
            queued_count: counts[5],
            proof_count: self.count_proofs().await?,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Aggregation state rows
    pub agg_state_count: u64,

    /// Calendar state rows
    pub cal_state_count: u64,

    /// Bitcoin anchor aggregation state rows
    pub anchor_btc_agg_state_count: u64,

    /// Bitcoin transaction state rows
    pub btctx_state_count: u64,

    /// Bitcoin head state rows
    pub btchead_state_count: u64,

    /// Stored proofs
    pub proof_count: u64,

    /// Events waiting in or claimed from the work queue
    pub queued_count: u64,
}
