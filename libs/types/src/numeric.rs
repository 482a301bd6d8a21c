//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! A `Price` is strictly positive; a `Quantity` is never negative.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::LevelError;

/// Parse a decimal from plain (`"42150.5"`) or scientific (`"1e-8"`) notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Price of a level, strictly positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a price, returning None unless the value is positive
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create a whole-number price
    ///
    /// # Panics
    /// Panics if `value` is zero
    pub fn from_u64(value: u64) -> Self {
        assert!(value > 0, "Price must be positive");
        Self(Decimal::from(value))
    }

    /// Get inner decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = LevelError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| LevelError::InvalidPrice(value.to_string()))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_decimal(s).ok_or_else(|| LevelError::Unparsable {
            field: "price",
            raw: s.to_string(),
        })?;
        Self::try_from(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Quantity resting at a level (or cumulative quantity), never negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Create a quantity, returning None if the value is negative
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Zero quantity
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Whether this quantity is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Get inner decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Sum of two quantities, None if it exceeds `Decimal::MAX`
    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_add(rhs.0).map(Quantity)
    }

    /// Sum of two quantities, clamped at `Decimal::MAX`
    pub fn saturating_add(self, rhs: Quantity) -> Quantity {
        self.checked_add(rhs).unwrap_or(Quantity(Decimal::MAX))
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = LevelError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| LevelError::InvalidQuantity(value.to_string()))
    }
}

impl From<Quantity> for Decimal {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl FromStr for Quantity {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_decimal(s).ok_or_else(|| LevelError::Unparsable {
            field: "qty",
            raw: s.to_string(),
        })?;
        Self::try_from(value)
    }
}

/// Saturating at `Decimal::MAX`: feed-supplied quantities must not panic.
impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = self.saturating_add(rhs);
    }
}

/// Saturating at zero: a quantity cannot go negative.
impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity((self.0 - rhs.0).max(Decimal::ZERO))
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_quantity_never_negative(a in 0i64..1_000_000, b in 0i64..1_000_000, scale in 0u32..8) {
            let qa = Quantity::try_from(Decimal::new(a, scale)).unwrap();
            let qb = Quantity::try_from(Decimal::new(b, scale)).unwrap();
            prop_assert!((qa - qb).as_decimal() >= Decimal::ZERO);
            prop_assert_eq!((qa + qb) - qb, qa);
        }

        #[test]
        fn prop_price_parse_display_stable(mantissa in 1i64..10_000_000_000, scale in 0u32..10) {
            let price = Price::try_from(Decimal::new(mantissa, scale)).unwrap();
            let reparsed: Price = price.to_string().parse().unwrap();
            prop_assert_eq!(price, reparsed);
        }
    }
}
