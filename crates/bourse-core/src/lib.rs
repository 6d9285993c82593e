//! # Bourse Core
//!
//! Core domain models and types for the equity price sync pipeline.
//!
//! This crate provides the building blocks shared by the data adapters
//! and the collector binary:
//! - instrument identity and freshness metadata types
//! - normalized daily price bars
//! - Euronext market reference tables (MIC and label suffixes)
//! - the port traits the orchestrator is written against
//! - the error taxonomy

pub mod domain;
pub mod error;
pub mod markets;
pub mod ports;

pub use domain::*;
pub use error::*;
pub use markets::*;
pub use ports::*;
