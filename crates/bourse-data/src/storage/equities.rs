//! Equities reference table repository.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use bourse_core::{
    AttemptOutcome, EquityKey, EquityStore, EquityTarget, QuoteCounts, Result, SyncError,
};

/// Written to `api` whenever a ticker is recorded.
const API_NAME: &str = "yahoo";

/// Stored freshness metadata of one equities row.
#[derive(Debug, Clone, FromRow)]
pub struct EquityCountersRow {
    pub isin: String,
    pub symbol: String,
    pub ticker: Option<String>,
    pub is_valid: bool,
    pub cnt_1y: i32,
    pub cnt_total: i32,
    pub first_quote_at: Option<NaiveDate>,
    pub last_quote_at: Option<NaiveDate>,
    pub w_date: Option<NaiveDate>,
}

impl EquityCountersRow {
    pub fn key(&self) -> EquityKey {
        EquityKey::new(self.isin.clone(), self.symbol.clone())
    }
}

#[derive(Clone)]
pub struct EquityRepository {
    pool: PgPool,
}

impl EquityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Counters and bounds as stored, for drift checks against the
    /// price table. Optionally narrowed to a symbol list.
    pub async fn counters_snapshot(
        &self,
        only: Option<&[String]>,
    ) -> Result<Vec<EquityCountersRow>> {
        sqlx::query_as(
            r#"
            SELECT isin, symbol, ticker, is_valid, cnt_1y, cnt_total,
                   first_quote_at, last_quote_at, w_date
            FROM equities
            WHERE is_delisted = FALSE
              AND ($1::text[] IS NULL OR symbol = ANY($1))
            ORDER BY symbol, isin
            "#,
        )
        .bind(only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))
    }

    /// Overwrites counters and quote bounds with values recomputed from
    /// the price table. The validity flag is left alone; the next sync
    /// run re-derives it.
    pub async fn repair_counters(
        &self,
        key: &EquityKey,
        counts: QuoteCounts,
        first: Option<NaiveDate>,
        last: Option<NaiveDate>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE equities
            SET cnt_1y = $3,
                cnt_total = $4,
                first_quote_at = $5,
                last_quote_at = $6
            WHERE isin = $1 AND symbol = $2
            "#,
        )
        .bind(&key.isin)
        .bind(&key.symbol)
        .bind(counts.last_year as i32)
        .bind(counts.total as i32)
        .bind(first)
        .bind(last)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        debug!(key = %key, cnt_1y = counts.last_year, cnt_total = counts.total, "counters repaired");
        Ok(())
    }
}

#[async_trait]
impl EquityStore for EquityRepository {
    async fn targets(
        &self,
        today: NaiveDate,
        limit: Option<i64>,
        only: Option<&[String]>,
    ) -> Result<Vec<EquityTarget>> {
        // LIMIT NULL means no limit
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT isin, symbol, market
            FROM equities
            WHERE (w_date IS NULL OR w_date < $1)
              AND is_delisted = FALSE
              AND ($2::text[] IS NULL OR symbol = ANY($2))
            ORDER BY symbol, isin
            LIMIT $3
            "#,
        )
        .bind(today)
        .bind(only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(isin, symbol, market)| EquityTarget {
                key: EquityKey::new(isin, symbol),
                market,
            })
            .collect())
    }

    async fn existing_ticker(&self, key: &EquityKey) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT ticker FROM equities WHERE isin = $1 AND symbol = $2")
                .bind(&key.isin)
                .bind(&key.symbol)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        // an empty string counts as unset
        Ok(row
            .and_then(|(ticker,)| ticker)
            .filter(|t| !t.trim().is_empty()))
    }

    async fn claim(&self, key: &EquityKey, today: NaiveDate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE equities
            SET w_date = $3
            WHERE isin = $1 AND symbol = $2
              AND (w_date IS NULL OR w_date < $3)
            "#,
        )
        .bind(&key.isin)
        .bind(&key.symbol)
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, outcome), fields(key = %key))]
    async fn mark_attempt(
        &self,
        key: &EquityKey,
        today: NaiveDate,
        outcome: &AttemptOutcome,
    ) -> Result<()> {
        // api travels with the ticker: both set, or both null
        let api = outcome.ticker.as_ref().map(|_| API_NAME);

        sqlx::query(
            r#"
            UPDATE equities
            SET ticker = $3,
                api = $4,
                is_valid = $5,
                cnt_1y = $6,
                cnt_total = $7,
                w_date = $8
            WHERE isin = $1 AND symbol = $2
            "#,
        )
        .bind(&key.isin)
        .bind(&key.symbol)
        .bind(&outcome.ticker)
        .bind(api)
        .bind(outcome.valid)
        .bind(outcome.cnt_1y as i32)
        .bind(outcome.cnt_total as i32)
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        debug!(
            valid = outcome.valid,
            cnt_1y = outcome.cnt_1y,
            cnt_total = outcome.cnt_total,
            "attempt recorded"
        );
        Ok(())
    }
}
