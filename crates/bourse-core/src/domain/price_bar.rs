//! Normalized daily price bar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily bar as normalized from the provider.
///
/// `close` is mandatory: rows without a close are dropped at the provider
/// boundary and never reach storage. Every other field may be missing on
/// sparse sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

impl PriceBar {
    /// Bar carrying only a close, for sparse provider rows and tests.
    pub fn close_only(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            adj_close: None,
            volume: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_only() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let bar = PriceBar::close_only(date, 42.5);
        assert_eq!(bar.date, date);
        assert_eq!(bar.close, 42.5);
        assert!(bar.open.is_none());
        assert!(bar.volume.is_none());
    }
}
