//! Job modules.

pub mod update_prices;
pub mod validate;

pub use update_prices::{update_prices, RunOptions, SyncOutcome};
pub use validate::{validate_prices, CounterDrift, ValidationReport};
