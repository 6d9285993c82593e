//! Market data providers.

pub mod resolver;
pub mod yahoo;
