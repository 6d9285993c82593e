//! Port traits between the orchestrator and its adapters.
//!
//! Production adapters live in `bourse-data`; tests substitute in-memory
//! fakes. Every method is fallible and async, and provider outcomes like
//! "unknown ticker" or "empty history" are plain values, not errors.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{AttemptOutcome, EquityKey, EquityTarget, PriceBar, QuoteCounts};
use crate::error::Result;

/// Daily market data source.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Cheap existence probe: number of daily quotes over the last few days.
    async fn probe_short_history(&self, ticker: &str) -> Result<usize>;

    /// Daily bars from `since` onward (with a small backward buffer), or the
    /// full available history when `since` is `None`.
    async fn fetch_daily_history(
        &self,
        ticker: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>>;
}

/// Instrument reference rows and their freshness metadata.
#[async_trait]
pub trait EquityStore: Send + Sync {
    /// Instruments due for processing: watermark older than `today`,
    /// not delisted, optionally filtered and limited.
    async fn targets(
        &self,
        today: NaiveDate,
        limit: Option<i64>,
        only: Option<&[String]>,
    ) -> Result<Vec<EquityTarget>>;

    /// Previously resolved ticker, if any.
    async fn existing_ticker(&self, key: &EquityKey) -> Result<Option<String>>;

    /// Atomically advances the watermark to `today`; `false` means another
    /// run already took the row.
    async fn claim(&self, key: &EquityKey, today: NaiveDate) -> Result<bool>;

    /// Writes the attempt outcome and advances the watermark.
    async fn mark_attempt(
        &self,
        key: &EquityKey,
        today: NaiveDate,
        outcome: &AttemptOutcome,
    ) -> Result<()>;
}

/// Stored daily price history.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Date of the most recent stored bar.
    async fn last_price_date(&self, key: &EquityKey) -> Result<Option<NaiveDate>>;

    /// Idempotent upsert keyed on `(isin, symbol, date)`; returns how many
    /// dates were newly inserted, excluding refreshed rows.
    async fn upsert_bars(&self, key: &EquityKey, bars: &[PriceBar]) -> Result<usize>;

    /// Counts recomputed from stored rows; `cutoff` bounds the windowed count.
    async fn recompute_counts(&self, key: &EquityKey, cutoff: NaiveDate) -> Result<QuoteCounts>;

    /// Refreshes first/last quote dates on the instrument row.
    async fn update_quote_bounds(&self, key: &EquityKey) -> Result<()>;
}
