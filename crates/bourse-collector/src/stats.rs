//! Run statistics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters for one synchronization run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Instruments selected for the run
    pub total: usize,
    /// Fully synchronized (resolved, fetched, persisted)
    pub updated: usize,
    /// No candidate ticker validated
    pub unresolved: usize,
    /// Failed after resolution (fetch or persistence)
    pub failed: usize,
    /// Skipped (already claimed by another run)
    pub skipped: usize,
    /// Newly inserted price rows across all instruments
    pub bars_inserted: usize,
    /// Wall-clock duration of the run
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instruments that reached a terminal outcome.
    pub fn processed(&self) -> usize {
        self.updated + self.unresolved + self.failed
    }

    /// Share of selected instruments that ended up fully synchronized (%).
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.updated as f64 / self.total as f64) * 100.0
        }
    }

    /// Final summary line.
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            updated = self.updated,
            unresolved = self.unresolved,
            failed = self.failed,
            skipped = self.skipped,
            bars_inserted = self.bars_inserted,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut stats = RunStats::new();
        assert_eq!(stats.success_rate(), 0.0);

        stats.total = 4;
        stats.updated = 3;
        stats.unresolved = 1;
        assert_eq!(stats.success_rate(), 75.0);
        assert_eq!(stats.processed(), 4);
    }
}
