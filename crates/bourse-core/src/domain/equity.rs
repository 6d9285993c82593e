//! Instrument identity and freshness metadata.

use serde::{Deserialize, Serialize};

/// Natural key of a tracked instrument.
///
/// The same ISIN can appear under several local symbols (multi-listed
/// securities), so both parts are needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquityKey {
    /// ISIN, e.g. `FR0000120271`
    pub isin: String,
    /// Local exchange symbol, e.g. `TTE`
    pub symbol: String,
}

impl EquityKey {
    pub fn new(isin: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            isin: isin.into(),
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for EquityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.isin, self.symbol)
    }
}

/// An instrument selected for processing in the current run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityTarget {
    pub key: EquityKey,
    /// Exchange hint from reference data: a MIC (`XPAR`) or a label (`Paris`).
    pub market: Option<String>,
}

/// Outcome of one sync attempt, written back to the instrument row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    /// Resolved provider ticker, `None` when resolution failed.
    pub ticker: Option<String>,
    /// Derived validity flag.
    pub valid: bool,
    /// Stored bars inside the trailing activity window.
    pub cnt_1y: i64,
    /// Stored bars in total.
    pub cnt_total: i64,
}

impl AttemptOutcome {
    /// Outcome of a failed attempt: no ticker, invalid, zeroed counters.
    pub fn failed() -> Self {
        Self {
            ticker: None,
            valid: false,
            cnt_1y: 0,
            cnt_total: 0,
        }
    }
}

/// Bar counts recomputed from the price store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCounts {
    /// All stored bars.
    pub total: i64,
    /// Bars on or after the window cutoff.
    pub last_year: i64,
}

impl QuoteCounts {
    /// Builds counts with the windowed value clamped to the total.
    pub fn normalized(total: i64, last_year: i64) -> Self {
        Self {
            total,
            last_year: last_year.min(total),
        }
    }
}

/// A ticker accepted by the resolution probe. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Provider ticker that answered, e.g. `TTE.PA`.
    pub ticker: String,
    /// Quotes observed during the probe.
    pub depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = EquityKey::new("FR0000120271", "TTE");
        assert_eq!(key.to_string(), "FR0000120271/TTE");
    }

    #[test]
    fn test_failed_outcome_is_zeroed() {
        let outcome = AttemptOutcome::failed();
        assert!(outcome.ticker.is_none());
        assert!(!outcome.valid);
        assert_eq!(outcome.cnt_1y, 0);
        assert_eq!(outcome.cnt_total, 0);
    }

    #[test]
    fn test_counts_clamped_to_total() {
        let counts = QuoteCounts::normalized(100, 250);
        assert_eq!(counts.total, 100);
        assert_eq!(counts.last_year, 100);

        let counts = QuoteCounts::normalized(250, 100);
        assert_eq!(counts.last_year, 100);
    }
}
