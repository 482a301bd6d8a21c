//! Price levels and level updates
//!
//! A `PriceLevel` is an immutable value; every change produces a new level.
//! `total` is the cumulative quantity from the best price through this level
//! and is derived, never authoritative: it is recomputed after every change
//! to the list the level belongs to.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::numeric::{Price, Quantity};

/// Format a decimal with exactly `decimals` fractional digits, rounding half away from zero.
pub fn format_fixed(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", decimals as usize, rounded)
}

/// A single aggregated price level of one book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Quantity,
    /// Cumulative quantity up to and including this level.
    #[serde(default)]
    pub total: Quantity,
}

impl PriceLevel {
    /// Create a level whose cumulative total is not yet computed
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self {
            price,
            quantity,
            total: Quantity::ZERO,
        }
    }

    /// A level with zero quantity is absent from the book
    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn with_quantity(&self, quantity: Quantity) -> Self {
        Self { quantity, ..*self }
    }

    pub fn with_total(&self, total: Quantity) -> Self {
        Self { total, ..*self }
    }

    pub fn format_price(&self, decimals: u32) -> String {
        format_fixed(self.price.as_decimal(), decimals)
    }

    pub fn format_quantity(&self, decimals: u32) -> String {
        format_fixed(self.quantity.as_decimal(), decimals)
    }

    pub fn format_total(&self, decimals: u32) -> String {
        format_fixed(self.total.as_decimal(), decimals)
    }
}

/// A validated incremental change to one price level
///
/// `qty == 0` removes the level; any other quantity inserts or replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpdate {
    pub price: Price,
    pub qty: Quantity,
}

impl LevelUpdate {
    pub fn new(price: Price, qty: Quantity) -> Self {
        Self { price, qty }
    }

    /// Whether this update deletes the level at `price`
    pub fn is_removal(&self) -> bool {
        self.qty.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: &str, qty: &str) -> PriceLevel {
        PriceLevel::new(price.parse().unwrap(), qty.parse().unwrap())
    }

    #[test]
    fn test_format_price_rounds() {
        let l = level("42150.5678", "2.5");
        assert_eq!(l.format_price(2), "42150.57");
        assert_eq!(l.format_price(4), "42150.5678");
    }

    #[test]
    fn test_format_pads_with_zeros() {
        let l = level("42150", "2.5");
        assert_eq!(l.format_price(2), "42150.00");
        assert_eq!(l.format_quantity(3), "2.500");
    }

    #[test]
    fn test_format_quantity_half_away_from_zero() {
        let l = level("100", "2.125");
        assert_eq!(l.format_quantity(2), "2.13");
    }

    #[test]
    fn test_empty_level() {
        assert!(level("42150", "0").is_empty());
        assert!(!level("42150", "2.5").is_empty());
    }

    #[test]
    fn test_with_quantity_keeps_original() {
        let original = level("42150", "2.5").with_total("10".parse().unwrap());
        let updated = original.with_quantity("3".parse().unwrap());

        assert_eq!(updated.price, original.price);
        assert_eq!(updated.quantity.as_decimal(), Decimal::from(3));
        assert_eq!(updated.total, original.total);
        assert_eq!(original.quantity.as_decimal(), Decimal::new(25, 1));
    }

    #[test]
    fn test_with_total() {
        let original = level("42150", "2.5");
        let updated = original.with_total("15".parse().unwrap());

        assert_eq!(updated.total.as_decimal(), Decimal::from(15));
        assert_eq!(updated.quantity, original.quantity);
        assert_eq!(updated.format_total(2), "15.00");
    }

    #[test]
    fn test_update_removal() {
        let remove = LevelUpdate::new(Price::from_u64(100), Quantity::ZERO);
        let insert = LevelUpdate::new(Price::from_u64(100), "1".parse().unwrap());
        assert!(remove.is_removal());
        assert!(!insert.is_removal());
    }
}
