//! Fragment state tables.
//!
//! Reads are batched: one `IN (...)` query per table per call, split into
//! chunks of [`MAX_KEYS_PER_QUERY`] keys. Missing keys are simply absent from
//! the result.

use anyhow::{Context, Result};
use proofgen_assembler::{
    AggStateRow, AnchorBtcAggStateRow, BtcHeadStateRow, BtcTxStateRow, CalStateRow,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{Storage, MAX_KEYS_PER_QUERY};

impl Storage {
    /// Aggregation states by hash_id.
    pub async fn get_agg_states(&self, hash_ids: &[String]) -> Result<Vec<AggStateRow>> {
        self.select_in(
            "SELECT hash_id, hash, agg_id, agg_state FROM agg_states",
            "hash_id",
            hash_ids,
            row_to_agg_state,
        )
        .await
        .context("Failed to fetch agg states")
    }

    /// Calendar states by agg_id.
    pub async fn get_cal_states(&self, agg_ids: &[String]) -> Result<Vec<CalStateRow>> {
        self.select_in(
            "SELECT agg_id, cal_id, cal_state FROM cal_states",
            "agg_id",
            agg_ids,
            row_to_cal_state,
        )
        .await
        .context("Failed to fetch cal states")
    }

    /// Bitcoin anchor aggregation states by cal_id.
    pub async fn get_anchor_btc_agg_states(
        &self,
        cal_ids: &[String],
    ) -> Result<Vec<AnchorBtcAggStateRow>> {
        self.select_in(
            "SELECT cal_id, anchor_btc_agg_id, anchor_btc_agg_state FROM anchor_btc_agg_states",
            "cal_id",
            cal_ids,
            row_to_anchor_btc_agg_state,
        )
        .await
        .context("Failed to fetch anchor_btc_agg states")
    }

    /// Bitcoin transaction states by anchor_btc_agg_id.
    pub async fn get_btctx_states(&self, anchor_btc_agg_ids: &[String]) -> Result<Vec<BtcTxStateRow>> {
        self.select_in(
            "SELECT anchor_btc_agg_id, btctx_id, btctx_state FROM btctx_states",
            "anchor_btc_agg_id",
            anchor_btc_agg_ids,
            row_to_btctx_state,
        )
        .await
        .context("Failed to fetch btctx states")
    }

    /// Bitcoin head states by btctx_id.
    pub async fn get_btchead_states(&self, btctx_ids: &[String]) -> Result<Vec<BtcHeadStateRow>> {
        self.select_in(
            "SELECT btctx_id, btchead_height, btchead_state FROM btchead_states",
            "btctx_id",
            btctx_ids,
            row_to_btchead_state,
        )
        .await
        .context("Failed to fetch btchead states")
    }

    /// Write an aggregation state (upstream stage).
    pub async fn put_agg_state(&self, row: &AggStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agg_states (hash_id, hash, agg_id, agg_state)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(hash_id) DO NOTHING
            "#,
        )
        .bind(&row.hash_id)
        .bind(&row.hash)
        .bind(&row.agg_id)
        .bind(&row.agg_state)
        .execute(&self.pool)
        .await
        .context("Failed to insert agg state")?;
        Ok(())
    }

    /// Write a calendar state (upstream stage).
    pub async fn put_cal_state(&self, row: &CalStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cal_states (agg_id, cal_id, cal_state)
            VALUES (?, ?, ?)
            ON CONFLICT(agg_id) DO NOTHING
            "#,
        )
        .bind(&row.agg_id)
        .bind(&row.cal_id)
        .bind(&row.cal_state)
        .execute(&self.pool)
        .await
        .context("Failed to insert cal state")?;
        Ok(())
    }

    /// Write a Bitcoin anchor aggregation state (upstream stage).
    pub async fn put_anchor_btc_agg_state(&self, row: &AnchorBtcAggStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO anchor_btc_agg_states (cal_id, anchor_btc_agg_id, anchor_btc_agg_state)
            VALUES (?, ?, ?)
            ON CONFLICT(cal_id) DO NOTHING
            "#,
        )
        .bind(&row.cal_id)
        .bind(&row.anchor_btc_agg_id)
        .bind(&row.anchor_btc_agg_state)
        .execute(&self.pool)
        .await
        .context("Failed to insert anchor_btc_agg state")?;
        Ok(())
    }

    /// Write a Bitcoin transaction state (upstream stage).
    pub async fn put_btctx_state(&self, row: &BtcTxStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO btctx_states (anchor_btc_agg_id, btctx_id, btctx_state)
            VALUES (?, ?, ?)
            ON CONFLICT(anchor_btc_agg_id) DO NOTHING
            "#,
        )
        .bind(&row.anchor_btc_agg_id)
        .bind(&row.btctx_id)
        .bind(&row.btctx_state)
        .execute(&self.pool)
        .await
        .context("Failed to insert btctx state")?;
        Ok(())
    }

    /// Write a Bitcoin head state (upstream stage).
    pub async fn put_btchead_state(&self, row: &BtcHeadStateRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO btchead_states (btctx_id, btchead_height, btchead_state)
            VALUES (?, ?, ?)
            ON CONFLICT(btctx_id) DO NOTHING
            "#,
        )
        .bind(&row.btctx_id)
        .bind(row.btchead_height)
        .bind(&row.btchead_state)
        .execute(&self.pool)
        .await
        .context("Failed to insert btchead state")?;
        Ok(())
    }

    /// Run `select WHERE column IN (keys)` in chunks and map every row.
    async fn select_in<T>(
        &self,
        select: &str,
        column: &str,
        keys: &[String],
        map: fn(SqliteRow) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(select);
            builder.push(" WHERE ").push(column).push(" IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                out.push(map(row)?);
            }
        }

        Ok(out)
    }
}

fn row_to_agg_state(row: SqliteRow) -> Result<AggStateRow> {
    Ok(AggStateRow {
        hash_id: row.try_get("hash_id")?,
        hash: row.try_get("hash")?,
        agg_id: row.try_get("agg_id")?,
        agg_state: row.try_get("agg_state")?,
    })
}

fn row_to_cal_state(row: SqliteRow) -> Result<CalStateRow> {
    Ok(CalStateRow {
        agg_id: row.try_get("agg_id")?,
        cal_id: row.try_get("cal_id")?,
        cal_state: row.try_get("cal_state")?,
    })
}

fn row_to_anchor_btc_agg_state(row: SqliteRow) -> Result<AnchorBtcAggStateRow> {
    Ok(AnchorBtcAggStateRow {
        cal_id: row.try_get("cal_id")?,
        anchor_btc_agg_id: row.try_get("anchor_btc_agg_id")?,
        anchor_btc_agg_state: row.try_get("anchor_btc_agg_state")?,
    })
}

fn row_to_btctx_state(row: SqliteRow) -> Result<BtcTxStateRow> {
    Ok(BtcTxStateRow {
        anchor_btc_agg_id: row.try_get("anchor_btc_agg_id")?,
        btctx_id: row.try_get("btctx_id")?,
        btctx_state: row.try_get("btctx_state")?,
    })
}

fn row_to_btchead_state(row: SqliteRow) -> Result<BtcHeadStateRow> {
    Ok(BtcHeadStateRow {
        btctx_id: row.try_get("btctx_id")?,
        btchead_height: row.try_get("btchead_height")?,
        btchead_state: row.try_get("btchead_state")?,
    })
}
