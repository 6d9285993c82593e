//! Batch price synchronization job for Euronext equities.
//!
//! This crate provides the binary that keeps the `equities` /
//! `equity_prices` tables current:
//! - ticker resolution against Yahoo Finance
//! - incremental daily OHLCV history fetch and idempotent upsert
//! - freshness counter recompute and validity flagging
//! - a drift validation pass over stored counters

pub mod config;
pub mod modules;
pub mod stats;

pub use bourse_core::{Result, SyncError};
pub use config::CollectorConfig;
pub use stats::RunStats;
