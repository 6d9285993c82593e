//! PostgreSQL storage.
//!
//! Repository pattern over two tables: `equities` (reference data plus
//! freshness metadata) and `equity_prices` (daily bars).

pub mod equities;
pub mod prices;
pub mod schema;

pub use equities::{EquityCountersRow, EquityRepository};
pub use prices::{AnomalousBar, FlatSeries, PriceAggregate, PriceRepository};
pub use schema::ensure_schema;
