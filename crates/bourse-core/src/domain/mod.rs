//! Domain models.

pub mod equity;
pub mod price_bar;

pub use equity::*;
pub use price_bar::*;
