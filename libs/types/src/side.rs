//! Book side and subscription depth
//!
//! The side owns the price ordering of its levels: bids are kept best
//! (highest) price first, asks best (lowest) price first.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DepthError;
use crate::numeric::Price;

/// One side of an order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Buy interest, sorted by price descending
    Bid,
    /// Sell interest, sorted by price ascending
    Ask,
}

impl BookSide {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            BookSide::Bid => BookSide::Ask,
            BookSide::Ask => BookSide::Bid,
        }
    }

    /// Order two prices so that the better price for this side comes first
    pub fn compare(&self, a: Price, b: Price) -> Ordering {
        match self {
            BookSide::Bid => b.cmp(&a),
            BookSide::Ask => a.cmp(&b),
        }
    }

    /// Whether `a` is strictly better than `b` on this side
    pub fn is_better(&self, a: Price, b: Price) -> bool {
        self.compare(a, b) == Ordering::Less
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookSide::Bid => write!(f, "bid"),
            BookSide::Ask => write!(f, "ask"),
        }
    }
}

/// Number of levels per side requested from the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BookDepth {
    #[default]
    D10,
    D25,
    D100,
    D500,
    D1000,
}

impl BookDepth {
    pub const ALL: [BookDepth; 5] = [
        BookDepth::D10,
        BookDepth::D25,
        BookDepth::D100,
        BookDepth::D500,
        BookDepth::D1000,
    ];

    /// Levels per side
    pub fn levels(&self) -> usize {
        match self {
            BookDepth::D10 => 10,
            BookDepth::D25 => 25,
            BookDepth::D100 => 100,
            BookDepth::D500 => 500,
            BookDepth::D1000 => 1000,
        }
    }
}

impl TryFrom<u32> for BookDepth {
    type Error = DepthError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(BookDepth::D10),
            25 => Ok(BookDepth::D25),
            100 => Ok(BookDepth::D100),
            500 => Ok(BookDepth::D500),
            1000 => Ok(BookDepth::D1000),
            other => Err(DepthError::Unsupported(other)),
        }
    }
}

impl From<BookDepth> for u32 {
    fn from(depth: BookDepth) -> Self {
        depth.levels() as u32
    }
}

impl fmt::Display for BookDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.levels())
    }
}
