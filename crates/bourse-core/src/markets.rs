//! Euronext market reference tables.
//!
//! Reference data carries a market hint per instrument, either an
//! operating MIC (`XPAR`) or a human label (`Paris`). Both map to the
//! ticker suffix the market data provider expects for that venue.

/// Operating MIC to provider ticker suffix.
pub const MIC_SUFFIXES: &[(&str, &str)] = &[
    ("XPAR", ".PA"), // Euronext Paris
    ("XAMS", ".AS"), // Euronext Amsterdam
    ("XBRU", ".BR"), // Euronext Brussels
    ("XLIS", ".LS"), // Euronext Lisbon
    ("XDUB", ".IR"), // Euronext Dublin
    ("XMIL", ".MI"), // Borsa Italiana
    ("XOSL", ".OL"), // Oslo Bors
];

/// Market label to provider ticker suffix, as found in imported reference data.
pub const MARKET_LABEL_SUFFIXES: &[(&str, &str)] = &[
    ("PARIS", ".PA"),
    ("AMSTERDAM", ".AS"),
    ("BRUSSELS", ".BR"),
    ("LISBON", ".LS"),
    ("DUBLIN", ".IR"),
    ("MILAN", ".MI"),
    ("OSLO", ".OL"),
];

/// Looks up the suffix for a market hint, MIC first, then label.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn suffix_for_market(market: &str) -> Option<&'static str> {
    let needle = market.trim().to_uppercase();
    if needle.is_empty() {
        return None;
    }

    MIC_SUFFIXES
        .iter()
        .chain(MARKET_LABEL_SUFFIXES.iter())
        .find(|(name, _)| *name == needle)
        .map(|(_, suffix)| *suffix)
}

/// All known suffixes in table order, deduplicated.
pub fn fallback_suffixes() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for (_, suffix) in MIC_SUFFIXES.iter().chain(MARKET_LABEL_SUFFIXES.iter()) {
        if !out.contains(suffix) {
            out.push(suffix);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mic_lookup() {
        assert_eq!(suffix_for_market("XPAR"), Some(".PA"));
        assert_eq!(suffix_for_market("XAMS"), Some(".AS"));
        assert_eq!(suffix_for_market("XOSL"), Some(".OL"));
    }

    #[test]
    fn test_label_lookup_case_insensitive() {
        assert_eq!(suffix_for_market("Paris"), Some(".PA"));
        assert_eq!(suffix_for_market("  brussels "), Some(".BR"));
        assert_eq!(suffix_for_market("MILAN"), Some(".MI"));
    }

    #[test]
    fn test_unknown_market() {
        assert_eq!(suffix_for_market("XNYS"), None);
        assert_eq!(suffix_for_market(""), None);
    }

    #[test]
    fn test_fallback_order_and_dedup() {
        let suffixes = fallback_suffixes();
        assert_eq!(
            suffixes,
            vec![".PA", ".AS", ".BR", ".LS", ".IR", ".MI", ".OL"]
        );
    }
}
