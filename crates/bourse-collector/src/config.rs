//! Environment-based configuration.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use crate::Result;
use bourse_core::SyncError;

/// Job configuration, collected once at startup.
///
/// Components receive their knobs from here instead of reading the
/// environment themselves.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Database URL
    pub database_url: String,
    /// Business timezone used to derive "today"
    pub app_tz: Tz,
    /// Trailing window for `cnt_1y`, in calendar days
    pub window_days: i64,
    /// Quotes required inside the window for `is_valid`
    pub min_active_quotes: i64,
    /// Probe horizon in calendar days
    pub probe_window_days: u32,
    /// Quotes a probe must return to accept a candidate
    pub probe_min_quotes: usize,
    /// Pause between instruments (ms)
    pub request_pause_ms: u64,
    /// Per-request HTTP timeout (s)
    pub http_timeout_secs: u64,
    /// Fetch attempts before giving up on an instrument
    pub max_retries: u32,
    /// Base backoff delay between fetch attempts (ms)
    pub retry_base_delay_ms: u64,
    /// Never try the raw unsuffixed symbol
    pub strict_suffix: bool,
}

impl CollectorConfig {
    /// Loads configuration from the environment (`.env` honored).
    /// Only `DATABASE_URL` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| SyncError::Config("DATABASE_URL is not set".to_string()))?;

        Ok(Self {
            database_url,
            app_tz: env_var_parse("APP_TZ", chrono_tz::Europe::Paris),
            window_days: env_var_parse("CNT_WINDOW_DAYS", 365),
            min_active_quotes: env_var_parse("ACTIVE_MIN_CNT_1Y", 200),
            probe_window_days: env_var_parse("VALID_WINDOW_DAYS", 5),
            probe_min_quotes: env_var_parse("VALID_MIN_QUOTES", 2),
            request_pause_ms: env_var_parse("REQUEST_PAUSE_MS", 600),
            http_timeout_secs: env_var_parse("YF_TIMEOUT_SECS", 20),
            max_retries: env_var_parse("YF_MAX_RETRIES", 3),
            retry_base_delay_ms: env_var_parse("RETRY_BASE_DELAY_MS", 5000),
            strict_suffix: env_var_bool("STRICT_SUFFIX", true),
        })
    }

    /// Pause between instruments.
    pub fn request_pause(&self) -> Duration {
        Duration::from_millis(self.request_pause_ms)
    }

    /// Per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Base backoff delay between fetch attempts.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Current date in the business timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.app_tz).date_naive()
    }

    /// Cutoff bounding the `cnt_1y` window.
    pub fn window_cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - chrono::Duration::days(self.window_days)
    }
}

/// Parses an environment variable, falling back to `default`.
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a boolean environment variable.
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
