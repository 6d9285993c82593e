//! End-to-end run scenarios over in-memory fakes.
//!
//! The orchestrator is generic over its ports, so these tests swap the
//! Yahoo client and the PostgreSQL repositories for scripted stand-ins
//! and assert on the recorded side effects.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use bourse_collector::modules::{update_prices, RunOptions};
use bourse_collector::CollectorConfig;
use bourse_core::{
    AttemptOutcome, EquityKey, EquityStore, EquityTarget, MarketDataProvider, PriceBar, PriceStore,
    QuoteCounts, Result, SyncError,
};

// =============================================================================
// Fakes
// =============================================================================

struct EquityRow {
    target: EquityTarget,
    ticker: Option<String>,
    w_date: Option<NaiveDate>,
    outcome: Option<AttemptOutcome>,
}

struct FakeEquities {
    rows: Mutex<Vec<EquityRow>>,
    refuse_claim: bool,
    claims: Mutex<usize>,
}

impl FakeEquities {
    fn new(targets: Vec<EquityTarget>) -> Self {
        Self {
            rows: Mutex::new(
                targets
                    .into_iter()
                    .map(|target| EquityRow {
                        target,
                        ticker: None,
                        w_date: None,
                        outcome: None,
                    })
                    .collect(),
            ),
            refuse_claim: false,
            claims: Mutex::new(0),
        }
    }

    fn refusing_claims(mut self) -> Self {
        self.refuse_claim = true;
        self
    }

    fn with_ticker(self, symbol: &str, ticker: &str) -> Self {
        {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.target.key.symbol == symbol) {
                row.ticker = Some(ticker.to_string());
            }
        }
        self
    }

    fn outcome(&self, symbol: &str) -> Option<AttemptOutcome> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.target.key.symbol == symbol)
            .and_then(|r| r.outcome.clone())
    }

    fn w_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.target.key.symbol == symbol)
            .and_then(|r| r.w_date)
    }

    fn reset_watermarks(&self) {
        for row in self.rows.lock().unwrap().iter_mut() {
            row.w_date = None;
        }
    }

    fn claim_count(&self) -> usize {
        *self.claims.lock().unwrap()
    }
}

#[async_trait]
impl EquityStore for FakeEquities {
    async fn targets(
        &self,
        today: NaiveDate,
        limit: Option<i64>,
        only: Option<&[String]>,
    ) -> Result<Vec<EquityTarget>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<EquityTarget> = rows
            .iter()
            .filter(|r| r.w_date.map_or(true, |d| d < today))
            .filter(|r| only.map_or(true, |o| o.contains(&r.target.key.symbol)))
            .map(|r| r.target.clone())
            .collect();
        out.sort_by(|a, b| a.key.symbol.cmp(&b.key.symbol));
        if let Some(limit) = limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn existing_ticker(&self, key: &EquityKey) -> Result<Option<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.target.key == key)
            .and_then(|r| r.ticker.clone()))
    }

    async fn claim(&self, key: &EquityKey, today: NaiveDate) -> Result<bool> {
        *self.claims.lock().unwrap() += 1;
        if self.refuse_claim {
            return Ok(false);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| &r.target.key == key) {
            Some(row) if row.w_date.map_or(true, |d| d < today) => {
                row.w_date = Some(today);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_attempt(
        &self,
        key: &EquityKey,
        today: NaiveDate,
        outcome: &AttemptOutcome,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| &r.target.key == key) {
            row.ticker = outcome.ticker.clone();
            row.w_date = Some(today);
            row.outcome = Some(outcome.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakePrices {
    bars: Mutex<HashMap<EquityKey, BTreeMap<NaiveDate, PriceBar>>>,
}

impl FakePrices {
    fn seed(&self, key: &EquityKey, bars: Vec<PriceBar>) {
        let mut map = self.bars.lock().unwrap();
        let entry = map.entry(key.clone()).or_default();
        for bar in bars {
            entry.insert(bar.date, bar);
        }
    }

    fn stored_count(&self, key: &EquityKey) -> usize {
        self.bars.lock().unwrap().get(key).map_or(0, |m| m.len())
    }
}

#[async_trait]
impl PriceStore for FakePrices {
    async fn last_price_date(&self, key: &EquityKey) -> Result<Option<NaiveDate>> {
        Ok(self
            .bars
            .lock()
            .unwrap()
            .get(key)
            .and_then(|m| m.keys().next_back().copied()))
    }

    async fn upsert_bars(&self, key: &EquityKey, bars: &[PriceBar]) -> Result<usize> {
        let mut map = self.bars.lock().unwrap();
        let entry = map.entry(key.clone()).or_default();
        let mut inserted = 0;
        for bar in bars {
            if entry.insert(bar.date, bar.clone()).is_none() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn recompute_counts(&self, key: &EquityKey, cutoff: NaiveDate) -> Result<QuoteCounts> {
        let map = self.bars.lock().unwrap();
        let (total, last_year) = map.get(key).map_or((0, 0), |m| {
            (
                m.len() as i64,
                m.keys().filter(|d| **d >= cutoff).count() as i64,
            )
        });
        Ok(QuoteCounts::normalized(total, last_year))
    }

    async fn update_quote_bounds(&self, _key: &EquityKey) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeProvider {
    depths: HashMap<String, usize>,
    history: HashMap<String, Vec<PriceBar>>,
    failing: HashSet<String>,
    fetches: Mutex<Vec<(String, Option<NaiveDate>)>>,
}

impl FakeProvider {
    fn with_listing(mut self, ticker: &str, depth: usize, history: Vec<PriceBar>) -> Self {
        self.depths.insert(ticker.to_string(), depth);
        self.history.insert(ticker.to_string(), history);
        self
    }

    fn with_failing_fetch(mut self, ticker: &str, depth: usize) -> Self {
        self.depths.insert(ticker.to_string(), depth);
        self.failing.insert(ticker.to_string());
        self
    }

    fn fetches(&self) -> Vec<(String, Option<NaiveDate>)> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    async fn probe_short_history(&self, ticker: &str) -> Result<usize> {
        Ok(self.depths.get(ticker).copied().unwrap_or(0))
    }

    async fn fetch_daily_history(
        &self,
        ticker: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>> {
        self.fetches
            .lock()
            .unwrap()
            .push((ticker.to_string(), since));

        if self.failing.contains(ticker) {
            return Err(SyncError::Http("connection timed out".to_string()));
        }

        let bars = self.history.get(ticker).cloned().unwrap_or_default();
        Ok(match since {
            // mirror the provider contract: since minus a one-day buffer
            Some(date) => {
                let start = date - Duration::days(1);
                bars.into_iter().filter(|b| b.date >= start).collect()
            }
            None => bars,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn test_config() -> CollectorConfig {
    CollectorConfig {
        database_url: "postgresql://unused".to_string(),
        app_tz: chrono_tz::Europe::Paris,
        window_days: 365,
        min_active_quotes: 200,
        probe_window_days: 5,
        probe_min_quotes: 2,
        request_pause_ms: 0,
        http_timeout_secs: 5,
        max_retries: 3,
        retry_base_delay_ms: 1,
        strict_suffix: true,
    }
}

fn target(isin: &str, symbol: &str, market: Option<&str>) -> EquityTarget {
    EquityTarget {
        key: EquityKey::new(isin, symbol),
        market: market.map(str::to_string),
    }
}

fn daily_bars(start: NaiveDate, count: usize) -> Vec<PriceBar> {
    (0..count)
        .map(|i| PriceBar::close_only(start + Duration::days(i as i64), 10.0 + i as f64 * 0.1))
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_happy_path_marks_instrument_valid() {
    let config = test_config();
    let today = config.today();

    let provider = FakeProvider::default().with_listing(
        "TTE.PA",
        4,
        daily_bars(today - Duration::days(349), 250),
    );
    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("Paris"))]);
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.bars_inserted, 250);

    let outcome = equities.outcome("TTE").unwrap();
    assert_eq!(outcome.ticker.as_deref(), Some("TTE.PA"));
    assert!(outcome.valid);
    assert_eq!(outcome.cnt_1y, 250);
    assert_eq!(outcome.cnt_total, 250);
    assert_eq!(equities.w_date("TTE"), Some(today));
    assert_eq!(
        prices.stored_count(&EquityKey::new("FR0000120271", "TTE")),
        250
    );
}

#[tokio::test]
async fn test_thin_recent_history_is_invalid() {
    let config = test_config();
    let today = config.today();

    // 400 bars stored, only 180 inside the trailing window
    let mut history = daily_bars(today - Duration::days(1000), 220);
    history.extend(daily_bars(today - Duration::days(179), 180));
    let provider = FakeProvider::default().with_listing("ABC.PA", 3, history);
    let equities = FakeEquities::new(vec![target("FR0000000001", "ABC", Some("XPAR"))]);
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    let outcome = equities.outcome("ABC").unwrap();
    assert_eq!(outcome.cnt_total, 400);
    assert_eq!(outcome.cnt_1y, 180);
    assert!(!outcome.valid);
}

#[tokio::test]
async fn test_unresolved_instrument_does_not_stop_the_run() {
    let config = test_config();
    let today = config.today();

    // AAA answers on no suffix at all; BBB is fine
    let provider = FakeProvider::default().with_listing(
        "BBB.PA",
        3,
        daily_bars(today - Duration::days(9), 10),
    );
    let equities = FakeEquities::new(vec![
        target("FR0000000001", "AAA", None),
        target("FR0000000002", "BBB", None),
    ]);
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.total, 2);
    assert_eq!(stats.unresolved, 1);
    assert_eq!(stats.updated, 1);

    let failed = equities.outcome("AAA").unwrap();
    assert_eq!(failed, AttemptOutcome::failed());
    assert_eq!(equities.w_date("AAA"), Some(today));

    assert!(equities.outcome("BBB").unwrap().ticker.is_some());
}

#[tokio::test]
async fn test_fetch_failure_is_isolated_and_recorded() {
    let config = test_config();
    let today = config.today();

    let provider = FakeProvider::default()
        .with_failing_fetch("AAA.PA", 5)
        .with_listing("BBB.PA", 3, daily_bars(today - Duration::days(9), 10));
    let equities = FakeEquities::new(vec![
        target("FR0000000001", "AAA", None),
        target("FR0000000002", "BBB", None),
    ]);
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.updated, 1);

    // failed attempt zeroes the counters and still advances the watermark
    assert_eq!(equities.outcome("AAA").unwrap(), AttemptOutcome::failed());
    assert_eq!(equities.w_date("AAA"), Some(today));
    assert_eq!(stats.bars_inserted, 10);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let config = test_config();
    let today = config.today();
    let key = EquityKey::new("FR0000120271", "TTE");

    let provider = FakeProvider::default().with_listing(
        "TTE.PA",
        4,
        daily_bars(today - Duration::days(49), 50),
    );
    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("Paris"))]);
    let prices = FakePrices::default();

    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let stats = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.bars_inserted, 0);
    assert_eq!(prices.stored_count(&key), 0);
    assert!(equities.outcome("TTE").is_none());
    assert_eq!(equities.w_date("TTE"), None);
}

#[tokio::test]
async fn test_incremental_fetch_resumes_from_last_stored_date() {
    let config = test_config();
    let today = config.today();
    let key = EquityKey::new("FR0000120271", "TTE");

    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("XPAR"))]);
    let prices = FakePrices::default();
    // stored history ends at today-10
    prices.seed(&key, daily_bars(today - Duration::days(14), 5));

    // provider returns the stored boundary date again plus five new days
    let provider = FakeProvider::default().with_listing(
        "TTE.PA",
        4,
        daily_bars(today - Duration::days(10), 6),
    );

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.bars_inserted, 5);
    assert_eq!(prices.stored_count(&key), 10);

    let fetches = provider.fetches();
    assert_eq!(fetches.len(), 1);
    assert_eq!(
        fetches[0],
        ("TTE.PA".to_string(), Some(today - Duration::days(10)))
    );

    assert_eq!(equities.outcome("TTE").unwrap().cnt_total, 10);
}

#[tokio::test]
async fn test_since_option_overrides_stored_window() {
    let config = test_config();
    let today = config.today();
    let key = EquityKey::new("FR0000120271", "TTE");

    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("Paris"))]);
    let prices = FakePrices::default();
    prices.seed(&key, daily_bars(today - Duration::days(9), 10));

    let provider = FakeProvider::default().with_listing(
        "TTE.PA",
        4,
        daily_bars(today - Duration::days(9), 10),
    );

    let since = today - Duration::days(400);
    let options = RunOptions {
        since: Some(since),
        ..Default::default()
    };
    update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();

    let fetches = provider.fetches();
    assert_eq!(fetches[0].1, Some(since));
}

#[tokio::test]
async fn test_rerun_with_same_history_inserts_nothing() {
    let config = test_config();
    let today = config.today();

    let provider = FakeProvider::default().with_listing(
        "TTE.PA",
        4,
        daily_bars(today - Duration::days(299), 250),
    );
    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("Paris"))]);
    let prices = FakePrices::default();
    let options = RunOptions::default();

    let first = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();
    assert_eq!(first.bars_inserted, 250);

    // everything was already attempted today
    let second = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();
    assert_eq!(second.total, 0);

    // next day, same provider data: refresh only, no growth
    equities.reset_watermarks();
    let third = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();
    assert_eq!(third.updated, 1);
    assert_eq!(third.bars_inserted, 0);
    assert_eq!(
        prices.stored_count(&EquityKey::new("FR0000120271", "TTE")),
        250
    );

    let fetches = provider.fetches();
    assert_eq!(fetches.len(), 2);
    // incremental window derived from the stored maximum date
    assert_eq!(fetches[1].1, Some(today - Duration::days(50)));
}

#[tokio::test]
async fn test_stale_stored_ticker_is_rediscovered() {
    let config = test_config();
    let today = config.today();

    // the stored ticker no longer answers; the resolver finds the new one
    let provider = FakeProvider::default().with_listing(
        "TTE.PA",
        4,
        daily_bars(today - Duration::days(9), 10),
    );
    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("Paris"))])
        .with_ticker("TTE", "TTE.MI");
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(
        equities.outcome("TTE").unwrap().ticker.as_deref(),
        Some("TTE.PA")
    );
}

#[tokio::test]
async fn test_only_and_limit_narrow_the_run() {
    let config = test_config();
    let today = config.today();

    let provider = FakeProvider::default()
        .with_listing("AAA.PA", 4, daily_bars(today - Duration::days(9), 5))
        .with_listing("CCC.PA", 4, daily_bars(today - Duration::days(9), 5));
    let equities = FakeEquities::new(vec![
        target("FR0000000001", "AAA", None),
        target("FR0000000002", "BBB", None),
        target("FR0000000003", "CCC", None),
    ]);
    let prices = FakePrices::default();

    let options = RunOptions {
        only: Some(vec!["AAA".to_string(), "CCC".to_string()]),
        limit: Some(1),
        ..Default::default()
    };
    let stats = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.updated, 1);
    assert!(equities.outcome("AAA").is_some());
    assert!(equities.outcome("BBB").is_none());
    assert!(equities.outcome("CCC").is_none());
}

#[tokio::test]
async fn test_negative_limit_is_rejected() {
    let config = test_config();
    let today = config.today();

    let provider =
        FakeProvider::default().with_listing("AAA.PA", 4, daily_bars(today - Duration::days(9), 5));
    let equities = FakeEquities::new(vec![target("FR0000000001", "AAA", None)]);
    let prices = FakePrices::default();

    let options = RunOptions {
        limit: Some(-1),
        ..Default::default()
    };
    let err = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidInput(_)));
    assert!(provider.fetches().is_empty());
    assert!(equities.outcome("AAA").is_none());
}

#[tokio::test]
async fn test_claim_mode_skips_rows_taken_elsewhere() {
    let config = test_config();
    let today = config.today();
    let options = RunOptions {
        claim: true,
        ..Default::default()
    };

    let provider = FakeProvider::default();
    let equities = FakeEquities::new(vec![
        target("FR0000000001", "AAA", None),
        target("FR0000000002", "BBB", None),
    ])
    .refusing_claims();
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();

    assert_eq!(stats.total, 2);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.updated, 0);
    assert!(provider.fetches().is_empty());
    assert_eq!(equities.claim_count(), 2);

    // a row we do win is processed normally
    let provider = FakeProvider::default().with_listing("AAA.PA", 4, daily_bars(today, 1));
    let equities = FakeEquities::new(vec![target("FR0000000001", "AAA", None)]);
    let stats = update_prices(&provider, &equities, &prices, &config, &options)
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(equities.claim_count(), 1);
    assert_eq!(equities.w_date("AAA"), Some(today));
}

#[tokio::test]
async fn test_empty_history_still_records_the_attempt() {
    let config = test_config();
    let today = config.today();

    let provider = FakeProvider::default().with_listing("TTE.PA", 4, Vec::new());
    let equities = FakeEquities::new(vec![target("FR0000120271", "TTE", Some("Paris"))]);
    let prices = FakePrices::default();

    let stats = update_prices(&provider, &equities, &prices, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.bars_inserted, 0);

    let outcome = equities.outcome("TTE").unwrap();
    assert_eq!(outcome.ticker.as_deref(), Some("TTE.PA"));
    assert!(!outcome.valid);
    assert_eq!(outcome.cnt_total, 0);
    assert_eq!(equities.w_date("TTE"), Some(today));
}
