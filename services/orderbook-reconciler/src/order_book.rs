//! Order book aggregate
//!
//! An `OrderBook` is an immutable value: symbol, both sides, the timestamp of
//! the last applied message and the venue checksum. Every snapshot and every
//! delta produces a new instance; published books are shared behind `Arc` and
//! never mutated.
//!
//! Bids are stored in descending price order (best bid first).
//! Asks are stored in ascending price order (best ask first).
//! All arithmetic uses `Decimal`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::MarketId;
use types::level::{format_fixed, PriceLevel};
use types::numeric::{Price, Quantity};

use crate::cross::is_crossed;
use crate::depth::{max_cumulative_total, with_cumulative_totals};

/// Level-2 view of one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    symbol: MarketId,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
    timestamp: DateTime<Utc>,
    checksum: u32,
}

impl OrderBook {
    /// Assemble a book from sides that are already sorted best price first.
    pub fn new(
        symbol: MarketId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp: DateTime<Utc>,
        checksum: u32,
    ) -> Self {
        Self {
            symbol,
            bids,
            asks,
            timestamp,
            checksum,
        }
    }

    pub fn symbol(&self) -> &MarketId {
        &self.symbol
    }

    /// Bid levels (descending price order).
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Ask levels (ascending price order).
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Highest bid.
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Lowest ask.
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Best ask minus best bid, zero when either side is empty.
    pub fn spread(&self) -> Decimal {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask.price.as_decimal() - bid.price.as_decimal(),
            _ => Decimal::ZERO,
        }
    }

    /// Average of best bid and best ask, zero when either side is empty.
    pub fn mid_price(&self) -> Decimal {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                let (bid, ask) = (bid.price.as_decimal(), ask.price.as_decimal());
                match bid.checked_add(ask) {
                    Some(sum) => sum / Decimal::TWO,
                    // Halve first near Decimal::MAX.
                    None => bid / Decimal::TWO + ask / Decimal::TWO,
                }
            }
            _ => Decimal::ZERO,
        }
    }

    /// Spread as a percentage of the mid price.
    pub fn spread_percentage(&self) -> Decimal {
        let mid = self.mid_price();
        if mid.is_zero() {
            return Decimal::ZERO;
        }
        self.spread() / mid * Decimal::ONE_HUNDRED
    }

    pub fn total_bid_volume(&self) -> Quantity {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    pub fn total_ask_volume(&self) -> Quantity {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// Bid volume over ask volume.
    ///
    /// Above one means more resting bids. `None` when there is bid volume but
    /// no ask volume, or the ratio exceeds `Decimal::MAX` (unbounded); one
    /// when both sides are empty. Volumes saturate at `Decimal::MAX`.
    pub fn volume_imbalance(&self) -> Option<Decimal> {
        let bid_volume = self.total_bid_volume().as_decimal();
        let ask_volume = self.total_ask_volume().as_decimal();

        if ask_volume.is_zero() {
            return if bid_volume > Decimal::ZERO {
                None
            } else {
                Some(Decimal::ONE)
            };
        }
        bid_volume.checked_div(ask_volume)
    }

    /// The best `max_levels` bids.
    pub fn bid_depth(&self, max_levels: usize) -> &[PriceLevel] {
        &self.bids[..max_levels.min(self.bids.len())]
    }

    /// The best `max_levels` asks.
    pub fn ask_depth(&self, max_levels: usize) -> &[PriceLevel] {
        &self.asks[..max_levels.min(self.asks.len())]
    }

    /// Both sides present.
    pub fn is_valid(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => is_crossed(bid.price, ask.price),
            _ => false,
        }
    }

    /// Copy of this book with cumulative totals recomputed on both sides.
    pub fn with_cumulative_totals(&self) -> OrderBook {
        OrderBook {
            bids: with_cumulative_totals(&self.bids),
            asks: with_cumulative_totals(&self.asks),
            ..self.clone()
        }
    }

    /// Deepest cumulative bid total, floored at one.
    pub fn max_bid_total(&self) -> Decimal {
        max_cumulative_total(&self.bids)
    }

    /// Deepest cumulative ask total, floored at one.
    pub fn max_ask_total(&self) -> Decimal {
        max_cumulative_total(&self.asks)
    }

    pub fn best_prices(&self) -> (Option<Price>, Option<Price>) {
        (
            self.best_bid().map(|l| l.price),
            self.best_ask().map(|l| l.price),
        )
    }

    pub fn format_spread(&self, decimals: u32) -> String {
        format_fixed(self.spread(), decimals)
    }

    /// Spread percentage with four decimals and a `%` suffix.
    pub fn format_spread_percentage(&self) -> String {
        format!("{}%", format_fixed(self.spread_percentage(), 4))
    }
}
