//! Stored data validation.
//!
//! Second-layer QA over stored data: recompute every instrument's
//! counters and quote bounds from `equity_prices` and compare them with
//! what the `equities` rows claim. The counters are write-only outputs
//! of the sync run, so any disagreement means a bug or out-of-band
//! write. The same pass flags stale histories, flat close series,
//! anomalous bars and watermarks dated after today. `fix` rewrites
//! drifted counters and bounds, nothing else.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use bourse_core::{EquityKey, QuoteCounts, Result, SyncError};
use bourse_data::{EquityCountersRow, EquityRepository, PriceAggregate, PriceRepository};

use crate::CollectorConfig;

/// Rows sampled per anomaly scan.
const ANOMALY_SAMPLE: i64 = 20;

/// One instrument whose stored counters disagree with the price table.
#[derive(Debug, Clone)]
pub struct CounterDrift {
    pub key: EquityKey,
    pub stored_cnt_1y: i32,
    pub stored_cnt_total: i32,
    pub actual_cnt_1y: i64,
    pub actual_cnt_total: i64,
}

/// Findings of one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Instruments examined
    pub instruments: usize,
    /// Stored counters or bounds differing from recomputed values
    pub drifts: Vec<CounterDrift>,
    /// Rows where the stored windowed count exceeds the stored total
    pub inconsistent: usize,
    /// Sampled stored bars violating sanity rules
    pub anomalous_bars: usize,
    /// Sampled instruments whose trailing closes never move
    pub flat_series: usize,
    /// Instruments without a recent bar, never-quoted ones included
    pub stale: usize,
    /// Watermarks dated after today
    pub future_watermarks: usize,
    /// Rows rewritten by the fix pass
    pub fixed: usize,
}

impl ValidationReport {
    /// `true` when the pass found nothing to report in any category.
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
            && self.inconsistent == 0
            && self.anomalous_bars == 0
            && self.flat_series == 0
            && self.stale == 0
            && self.future_watermarks == 0
    }
}

/// Checks stored counters against the price table, flags suspicious
/// rows and instruments left behind, optionally repairing drifted
/// counters. An instrument counts as stale after `stale_days` without
/// a bar.
pub async fn validate_prices(
    equities: &EquityRepository,
    prices: &PriceRepository,
    config: &CollectorConfig,
    fix: bool,
    stale_days: i64,
) -> Result<ValidationReport> {
    if stale_days < 0 {
        return Err(SyncError::InvalidInput(format!(
            "stale-days must not be negative: {}",
            stale_days
        )));
    }

    let today = config.today();
    let cutoff = config.window_cutoff(today);
    let mut report = ValidationReport::default();

    let stored = equities.counters_snapshot(None).await?;
    report.instruments = stored.len();

    let actuals: HashMap<EquityKey, PriceAggregate> = prices
        .aggregates(cutoff, None)
        .await?
        .into_iter()
        .map(|agg| (agg.key(), agg))
        .collect();

    for row in &stored {
        let key = row.key();
        let actual = actuals.get(&key);

        if row.cnt_1y > row.cnt_total {
            report.inconsistent += 1;
            warn!(
                key = %key,
                cnt_1y = row.cnt_1y,
                cnt_total = row.cnt_total,
                "stored windowed count exceeds total"
            );
        }

        if watermark_in_future(row, today) {
            report.future_watermarks += 1;
            warn!(key = %key, w_date = ?row.w_date, "watermark dated after today");
        }

        let last_bar = actual.and_then(|a| a.last_date);
        if is_stale(last_bar, today, stale_days) {
            report.stale += 1;
            match last_bar {
                Some(date) => warn!(
                    key = %key,
                    last_price_date = %date,
                    days_behind = (today - date).num_days(),
                    "stale history"
                ),
                None => warn!(key = %key, "no stored history"),
            }
        }

        if !counters_drifted(row, actual) {
            continue;
        }

        let (actual_total, actual_1y) = actual.map(|a| (a.cnt_total, a.cnt_1y)).unwrap_or((0, 0));
        warn!(
            key = %key,
            stored_cnt_1y = row.cnt_1y,
            stored_cnt_total = row.cnt_total,
            actual_cnt_1y = actual_1y,
            actual_cnt_total = actual_total,
            "counter drift"
        );
        report.drifts.push(CounterDrift {
            key: key.clone(),
            stored_cnt_1y: row.cnt_1y,
            stored_cnt_total: row.cnt_total,
            actual_cnt_1y: actual_1y,
            actual_cnt_total: actual_total,
        });

        if fix {
            let counts = QuoteCounts::normalized(actual_total, actual_1y);
            let (first, last) = actual
                .map(|a| (a.first_date, a.last_date))
                .unwrap_or((None, None));
            equities.repair_counters(&key, counts, first, last).await?;
            report.fixed += 1;
        }
    }

    let anomalies = prices.anomalous_bars(ANOMALY_SAMPLE).await?;
    report.anomalous_bars = anomalies.len();
    for bar in &anomalies {
        warn!(
            isin = %bar.isin,
            symbol = %bar.symbol,
            price_date = %bar.price_date,
            close = bar.close_price,
            volume = ?bar.volume,
            "anomalous bar"
        );
    }

    let flats = prices.flat_series(ANOMALY_SAMPLE).await?;
    report.flat_series = flats.len();
    for flat in &flats {
        warn!(
            isin = %flat.isin,
            symbol = %flat.symbol,
            close = flat.close_price,
            "flat close series"
        );
    }

    info!(
        instruments = report.instruments,
        drifted = report.drifts.len(),
        inconsistent = report.inconsistent,
        anomalous_bars = report.anomalous_bars,
        flat_series = report.flat_series,
        stale = report.stale,
        future_watermarks = report.future_watermarks,
        fixed = report.fixed,
        "validation finished"
    );

    Ok(report)
}

/// `true` when stored counters or bounds disagree with the recomputed
/// aggregate. A missing aggregate means zero stored bars.
fn counters_drifted(row: &EquityCountersRow, actual: Option<&PriceAggregate>) -> bool {
    let (cnt_total, cnt_1y, first, last) = match actual {
        Some(a) => (a.cnt_total, a.cnt_1y, a.first_date, a.last_date),
        None => (0, 0, None, None),
    };

    i64::from(row.cnt_total) != cnt_total
        || i64::from(row.cnt_1y) != cnt_1y
        || row.first_quote_at != first
        || row.last_quote_at != last
}

/// `true` when the stored watermark claims a run that has not happened
/// yet.
fn watermark_in_future(row: &EquityCountersRow, today: NaiveDate) -> bool {
    row.w_date.map_or(false, |w| w > today)
}

/// `true` when the newest stored bar is at least `stale_days` old.
/// An instrument with no bars at all is stale too.
fn is_stale(last_bar: Option<NaiveDate>, today: NaiveDate, stale_days: i64) -> bool {
    match last_bar {
        Some(date) => (today - date).num_days() >= stale_days,
        None => true,
    }
}
