//! Types library for order-book reconciliation
//!
//! Value types shared by the feed contract and the reconciliation engine.
//! Prices and quantities are fixed-point decimals so that merges, totals and
//! spreads are exact and deterministic.
//!
//! # Modules
//! - `ids`: Identifiers (MarketId, SubscriptionId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `side`: Book side and the allowed subscription depths
//! - `level`: Price levels and validated level updates
//! - `errors`: Data error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod side;
pub mod level;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::side::*;
    pub use crate::level::*;
    pub use crate::errors::*;
}
