//! Symbol-to-ticker resolution.
//!
//! Local reference data carries bare exchange symbols (`TTE`, `ASML`),
//! while the provider wants venue-suffixed tickers (`TTE.PA`, `ASML.AS`).
//! The resolver builds a fixed-order candidate list and probes each with
//! a short history request until one answers with enough quotes.

use tracing::debug;

use bourse_core::{
    fallback_suffixes, suffix_for_market, EquityTarget, MarketDataProvider, Resolution,
};

/// Candidate-generation and acceptance knobs.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Quotes a short probe must return before a candidate is accepted.
    /// Filters out delisted symbols that still answer with one stale snapshot.
    pub min_probe_quotes: usize,
    /// When set, the raw unsuffixed symbol is never tried.
    pub strict_suffix: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            min_probe_quotes: 2,
            strict_suffix: true,
        }
    }
}

/// Stateless resolver: nothing survives from one instrument to the next.
#[derive(Debug, Clone, Default)]
pub struct TickerResolver {
    options: ResolverOptions,
}

impl TickerResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Ordered candidate tickers for a target.
    ///
    /// Market-specific suffix first when the hint maps to one, then every
    /// known suffix in table order, then the raw symbol unless strict mode
    /// forbids it. Duplicates keep their first position.
    pub fn candidates(&self, target: &EquityTarget) -> Vec<String> {
        let symbol = target.key.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        if let Some(suffix) = target.market.as_deref().and_then(suffix_for_market) {
            push_unique(&mut out, format!("{}{}", symbol, suffix));
        }
        for suffix in fallback_suffixes() {
            push_unique(&mut out, format!("{}{}", symbol, suffix));
        }
        if !self.options.strict_suffix {
            push_unique(&mut out, symbol);
        }
        out
    }

    /// Re-checks a previously resolved ticker before trusting it for
    /// another run. `None` when the probe comes back shallow or fails.
    pub async fn check_known<P>(&self, provider: &P, ticker: &str) -> Option<Resolution>
    where
        P: MarketDataProvider + ?Sized,
    {
        match provider.probe_short_history(ticker).await {
            Ok(depth) if depth >= self.options.min_probe_quotes => Some(Resolution {
                ticker: ticker.to_string(),
                depth,
            }),
            Ok(depth) => {
                debug!(ticker = ticker, depth = depth, "known ticker probe too shallow");
                None
            }
            Err(e) => {
                debug!(ticker = ticker, error = %e, "known ticker probe failed");
                None
            }
        }
    }

    /// Walks the candidate list and returns the first ticker whose probe
    /// meets the quote threshold. A probe error disqualifies only the
    /// candidate that raised it.
    pub async fn resolve<P>(&self, provider: &P, target: &EquityTarget) -> Option<Resolution>
    where
        P: MarketDataProvider + ?Sized,
    {
        for candidate in self.candidates(target) {
            match provider.probe_short_history(&candidate).await {
                Ok(depth) if depth >= self.options.min_probe_quotes => {
                    return Some(Resolution {
                        ticker: candidate,
                        depth,
                    });
                }
                Ok(depth) => {
                    debug!(candidate = %candidate, depth = depth, "candidate below quote threshold");
                }
                Err(e) => {
                    debug!(candidate = %candidate, error = %e, "candidate probe failed");
                }
            }
        }
        None
    }
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
    if !out.contains(&candidate) {
        out.push(candidate);
    }
}
