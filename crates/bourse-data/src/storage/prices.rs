//! Daily price history repository.
//!
//! The upsert keyed on `(isin, symbol, price_date)` is what makes the
//! whole job re-runnable: overlapping fetch windows refresh rows in
//! place instead of duplicating them.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use bourse_core::{EquityKey, PriceBar, PriceStore, QuoteCounts, Result, SyncError};

/// Rows per UNNEST batch.
const UPSERT_CHUNK: usize = 500;

/// Trailing closes examined by the flat-series check.
const FLAT_WINDOW: i64 = 5;

/// Aggregates recomputed from stored bars, one row per instrument.
#[derive(Debug, Clone, FromRow)]
pub struct PriceAggregate {
    pub isin: String,
    pub symbol: String,
    pub cnt_total: i64,
    pub cnt_1y: i64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl PriceAggregate {
    pub fn key(&self) -> EquityKey {
        EquityKey::new(self.isin.clone(), self.symbol.clone())
    }
}

/// A stored bar violating a sanity rule.
#[derive(Debug, Clone, FromRow)]
pub struct AnomalousBar {
    pub isin: String,
    pub symbol: String,
    pub price_date: NaiveDate,
    pub close_price: f64,
    pub volume: Option<i64>,
}

/// An instrument whose trailing closes are all the same value.
#[derive(Debug, Clone, FromRow)]
pub struct FlatSeries {
    pub isin: String,
    pub symbol: String,
    pub close_price: f64,
}

#[derive(Clone)]
pub struct PriceRepository {
    pool: PgPool,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Per-instrument aggregates over the whole price table, for drift
    /// checks against the equities counters.
    pub async fn aggregates(
        &self,
        cutoff: NaiveDate,
        only: Option<&[String]>,
    ) -> Result<Vec<PriceAggregate>> {
        sqlx::query_as(
            r#"
            SELECT isin, symbol,
                   COUNT(*) AS cnt_total,
                   COUNT(*) FILTER (WHERE price_date >= $1) AS cnt_1y,
                   MIN(price_date) AS first_date,
                   MAX(price_date) AS last_date
            FROM equity_prices
            WHERE ($2::text[] IS NULL OR symbol = ANY($2))
            GROUP BY isin, symbol
            ORDER BY symbol, isin
            "#,
        )
        .bind(cutoff)
        .bind(only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))
    }

    /// Stored bars that fail basic sanity rules: non-positive prices,
    /// negative volume, high below low.
    pub async fn anomalous_bars(&self, limit: i64) -> Result<Vec<AnomalousBar>> {
        sqlx::query_as(
            r#"
            SELECT isin, symbol, price_date, close_price, volume
            FROM equity_prices
            WHERE close_price <= 0
               OR open_price <= 0
               OR high_price <= 0
               OR low_price <= 0
               OR volume < 0
               OR high_price < low_price
            ORDER BY isin, symbol, price_date
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))
    }

    /// Instruments whose last `FLAT_WINDOW` closes are identical, a
    /// sign of a dead listing or a stuck source.
    pub async fn flat_series(&self, limit: i64) -> Result<Vec<FlatSeries>> {
        sqlx::query_as(
            r#"
            WITH recent AS (
                SELECT isin, symbol, close_price,
                       ROW_NUMBER() OVER (
                           PARTITION BY isin, symbol
                           ORDER BY price_date DESC
                       ) AS rn
                FROM equity_prices
            )
            SELECT isin, symbol, MAX(close_price) AS close_price
            FROM recent
            WHERE rn <= $1
            GROUP BY isin, symbol
            HAVING COUNT(*) = $1 AND MIN(close_price) = MAX(close_price)
            ORDER BY isin, symbol
            LIMIT $2
            "#,
        )
        .bind(FLAT_WINDOW)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))
    }
}

#[async_trait]
impl PriceStore for PriceRepository {
    async fn last_price_date(&self, key: &EquityKey) -> Result<Option<NaiveDate>> {
        let row: (Option<NaiveDate>,) =
            sqlx::query_as("SELECT MAX(price_date) FROM equity_prices WHERE isin = $1 AND symbol = $2")
                .bind(&key.isin)
                .bind(&key.symbol)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(row.0)
    }

    #[instrument(skip(self, bars), fields(key = %key, count = bars.len()))]
    async fn upsert_bars(&self, key: &EquityKey, bars: &[PriceBar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        // One date, one row: the conflict clause may not touch the same
        // row twice within a statement. Last occurrence wins.
        let mut unique: BTreeMap<NaiveDate, &PriceBar> = BTreeMap::new();
        for bar in bars {
            unique.insert(bar.date, bar);
        }
        let deduped: Vec<&PriceBar> = unique.into_values().collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        // Existing dates first, so the returned count reflects truly new
        // rows rather than refreshed ones.
        let existing: Vec<(NaiveDate,)> =
            sqlx::query_as("SELECT price_date FROM equity_prices WHERE isin = $1 AND symbol = $2")
                .bind(&key.isin)
                .bind(&key.symbol)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;
        let existing: HashSet<NaiveDate> = existing.into_iter().map(|(d,)| d).collect();

        let inserted = deduped
            .iter()
            .filter(|b| !existing.contains(&b.date))
            .count();

        for chunk in deduped.chunks(UPSERT_CHUNK) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|b| b.date).collect();
            let opens: Vec<Option<f64>> = chunk.iter().map(|b| b.open).collect();
            let highs: Vec<Option<f64>> = chunk.iter().map(|b| b.high).collect();
            let lows: Vec<Option<f64>> = chunk.iter().map(|b| b.low).collect();
            let closes: Vec<f64> = chunk.iter().map(|b| b.close).collect();
            let adj_closes: Vec<Option<f64>> = chunk.iter().map(|b| b.adj_close).collect();
            let volumes: Vec<Option<i64>> = chunk.iter().map(|b| b.volume).collect();

            sqlx::query(
                r#"
                INSERT INTO equity_prices
                    (isin, symbol, price_date,
                     open_price, high_price, low_price, close_price, adj_close, volume)
                SELECT $1::text, $2::text, * FROM UNNEST(
                    $3::date[],
                    $4::float8[], $5::float8[], $6::float8[], $7::float8[],
                    $8::float8[], $9::int8[]
                )
                ON CONFLICT (isin, symbol, price_date) DO UPDATE SET
                    open_price = EXCLUDED.open_price,
                    high_price = EXCLUDED.high_price,
                    low_price = EXCLUDED.low_price,
                    close_price = EXCLUDED.close_price,
                    adj_close = EXCLUDED.adj_close,
                    volume = EXCLUDED.volume
                "#,
            )
            .bind(&key.isin)
            .bind(&key.symbol)
            .bind(&dates)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&adj_closes)
            .bind(&volumes)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        debug!(inserted = inserted, "bars upserted");
        Ok(inserted)
    }

    async fn recompute_counts(&self, key: &EquityKey, cutoff: NaiveDate) -> Result<QuoteCounts> {
        let (total, last_year): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE price_date >= $3)
            FROM equity_prices
            WHERE isin = $1 AND symbol = $2
            "#,
        )
        .bind(&key.isin)
        .bind(&key.symbol)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(QuoteCounts::normalized(total, last_year))
    }

    async fn update_quote_bounds(&self, key: &EquityKey) -> Result<()> {
        // no-op for instruments without stored bars
        sqlx::query(
            r#"
            UPDATE equities e
            SET first_quote_at = b.first_date,
                last_quote_at = b.last_date
            FROM (
                SELECT MIN(price_date) AS first_date, MAX(price_date) AS last_date
                FROM equity_prices
                WHERE isin = $1 AND symbol = $2
            ) b
            WHERE e.isin = $1 AND e.symbol = $2
              AND b.first_date IS NOT NULL
            "#,
        )
        .bind(&key.isin)
        .bind(&key.symbol)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }
}
