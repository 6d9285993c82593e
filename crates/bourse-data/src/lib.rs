//! Market data access and storage.
//!
//! This crate provides:
//! - the Yahoo Finance chart client (existence probe + incremental daily history)
//! - ticker resolution across Euronext suffix conventions
//! - PostgreSQL repositories for instruments and prices
//! - idempotent schema bootstrap

pub mod provider;
pub mod storage;

pub use provider::resolver::{ResolverOptions, TickerResolver};
pub use provider::yahoo::{RetryPolicy, YahooChartClient};
pub use storage::equities::{EquityCountersRow, EquityRepository};
pub use storage::prices::{AnomalousBar, FlatSeries, PriceAggregate, PriceRepository};
pub use storage::schema::ensure_schema;
