//! Yahoo Finance v8 chart API client.
//!
//! The only module that knows the provider's response shape; everything
//! downstream sees normalized [`PriceBar`]s. The base URL is injectable
//! so tests can point the client at a local mock server.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use bourse_core::{MarketDataProvider, PriceBar, Result, SyncError};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

// Yahoo rejects requests without a browser user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Retry budget for transient fetch failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Backoff grows linearly: `base_delay * attempt`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// Yahoo chart API client.
///
/// Probes carry no retry; incremental fetches retry transient failures
/// per the configured [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    client: Client,
    base_url: String,
    probe_range_days: u32,
    retry: RetryPolicy,
}

impl YahooChartClient {
    /// Builds a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            probe_range_days: 5,
            retry: RetryPolicy::default(),
        })
    }

    /// Overrides the API host. Tests point this at a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the retry budget for incremental fetches.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the probe horizon in calendar days.
    pub fn with_probe_window(mut self, days: u32) -> Self {
        self.probe_range_days = days;
        self
    }

    /// One GET against the chart endpoint, outcome already normalized.
    async fn get_chart(&self, ticker: &str, query: &str) -> Result<Vec<PriceBar>> {
        let url = format!(
            "{}/v8/finance/chart/{}?{}&interval=1d&events=history",
            self.base_url, ticker, query
        );
        debug!(url = %url, "requesting chart");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // Unknown or delisted ticker: no data, not an error.
            return Ok(Vec::new());
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SyncError::RateLimited(format!("{} for {}", status, ticker)));
        }
        if !status.is_success() {
            return Err(SyncError::Http(format!("{} for {}", status, ticker)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Http(e.to_string()))?;

        match decode_chart(&body) {
            Ok(bars) => Ok(bars),
            Err(SyncError::DataShape(msg)) => {
                warn!(ticker = ticker, error = %msg, "unparseable chart payload, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_once(&self, ticker: &str, since: Option<NaiveDate>) -> Result<Vec<PriceBar>> {
        let query = match since {
            Some(date) => {
                // One day back: the last stored session may have been partial
                // and provider range boundaries are fuzzy. The upsert makes
                // the overlap harmless.
                let start = date - chrono::Duration::days(1);
                let period1 = Utc
                    .from_utc_datetime(&start.and_time(NaiveTime::MIN))
                    .timestamp();
                let period2 = Utc::now().timestamp();
                format!("period1={}&period2={}", period1, period2)
            }
            None => "range=max".to_string(),
        };
        self.get_chart(ticker, &query).await
    }
}

#[async_trait]
impl MarketDataProvider for YahooChartClient {
    async fn probe_short_history(&self, ticker: &str) -> Result<usize> {
        let query = format!("range={}d", self.probe_range_days);
        let bars = self.get_chart(ticker, &query).await?;
        Ok(bars.len())
    }

    async fn fetch_daily_history(
        &self,
        ticker: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>> {
        with_retry(&self.retry, ticker, || self.fetch_once(ticker, since)).await
    }
}

/// Runs `op` until it succeeds, retrying transient failures with a
/// linearly growing delay until the attempt budget is spent.
async fn with_retry<T, F, Fut>(policy: &RetryPolicy, ticker: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.base_delay * attempt;
                warn!(
                    ticker = ticker,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient fetch failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Flattens a chart payload into normalized daily bars.
///
/// Rows without a close are dropped, epoch timestamps become calendar
/// dates (UTC, time of day discarded), duplicate dates keep the last
/// occurrence, and the result is sorted ascending.
fn decode_chart(body: &str) -> Result<Vec<PriceBar>> {
    let response: YahooChartResponse =
        serde_json::from_str(body).map_err(|e| SyncError::DataShape(e.to_string()))?;

    if let Some(error) = response.chart.error {
        debug!(code = %error.code, description = %error.description, "chart error payload");
        return Ok(Vec::new());
    }

    let result = match response.chart.result.and_then(|r| r.into_iter().next()) {
        Some(result) => result,
        None => return Ok(Vec::new()),
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = match result.indicators.quote.into_iter().next() {
        Some(quote) => quote,
        None => return Ok(Vec::new()),
    };

    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();
    let adj_closes = result
        .indicators
        .adj_close
        .and_then(|ac| ac.into_iter().next())
        .and_then(|ac| ac.adj_close)
        .unwrap_or_default();

    let mut bars: Vec<PriceBar> = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        // A bar without a close is unusable downstream.
        let close = match closes.get(i).copied().flatten() {
            Some(close) => close,
            None => continue,
        };
        let date = match DateTime::from_timestamp(*ts, 0) {
            Some(dt) => dt.date_naive(),
            None => continue,
        };

        bars.push(PriceBar {
            date,
            open: opens.get(i).copied().flatten(),
            high: highs.get(i).copied().flatten(),
            low: lows.get(i).copied().flatten(),
            close,
            adj_close: adj_closes.get(i).copied().flatten(),
            volume: volumes.get(i).copied().flatten(),
        });
    }

    bars.sort_by_key(|b| b.date);

    // The provider occasionally repeats the live session; keep the last row.
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(prev) if prev.date == bar.date => *prev = bar,
            _ => out.push(bar),
        }
    }

    Ok(out)
}

// =============================================================================
// Yahoo Finance v8 response model
// =============================================================================

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
    #[serde(rename = "adjclose")]
    adj_close: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<i64>>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    #[serde(rename = "adjclose")]
    adj_close: Option<Vec<Option<f64>>>,
}
