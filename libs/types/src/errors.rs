//! Error types for book data
//!
//! Data errors are raised per level entry and never abort a whole message.

use thiserror::Error;

/// A single price-level entry that cannot be applied to a book
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Unparsable {field}: {raw}")]
    Unparsable { field: &'static str, raw: String },
}

/// Subscription depth outside the set offered by the feed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepthError {
    #[error("Unsupported depth {0}: expected one of 10, 25, 100, 500, 1000")]
    Unsupported(u32),
}
