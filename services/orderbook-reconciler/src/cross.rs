//! Crossed-book detection and repair
//!
//! Bid-side and ask-side changes reach the book as separate streams and can
//! briefly disagree, leaving `best_bid >= best_ask`. The repair prunes both
//! sides against the best prices captured before either side is touched:
//! every bid at or above the original best ask and every ask at or below the
//! original best bid is dropped. Touching prices count as crossed.

use tracing::warn;
use types::level::PriceLevel;
use types::numeric::Price;

/// Whether a bid and an ask at these prices overlap
pub fn is_crossed(best_bid: Price, best_ask: Price) -> bool {
    best_bid >= best_ask
}

/// Sanitized sides plus the number of levels removed from each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossResolution {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub removed_bids: usize,
    pub removed_asks: usize,
}

impl CrossResolution {
    /// Whether any level had to be removed
    pub fn was_crossed(&self) -> bool {
        self.removed_bids > 0 || self.removed_asks > 0
    }
}

/// Remove mutually crossed levels from candidate bid and ask sides.
///
/// Sides must be sorted best price first. Uncrossed input is returned unchanged.
pub fn resolve_crossed(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> CrossResolution {
    let (best_bid, best_ask) = match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => (bid.price, ask.price),
        _ => return uncrossed(bids, asks),
    };

    if !is_crossed(best_bid, best_ask) {
        return uncrossed(bids, asks);
    }

    let bid_count = bids.len();
    let ask_count = asks.len();

    let bids: Vec<PriceLevel> = bids.into_iter().filter(|l| l.price < best_ask).collect();
    let asks: Vec<PriceLevel> = asks.into_iter().filter(|l| l.price > best_bid).collect();

    let resolution = CrossResolution {
        removed_bids: bid_count - bids.len(),
        removed_asks: ask_count - asks.len(),
        bids,
        asks,
    };

    warn!(
        original_best_bid = %best_bid,
        original_best_ask = %best_ask,
        removed_bids = resolution.removed_bids,
        removed_asks = resolution.removed_asks,
        new_best_bid = ?resolution.bids.first().map(|l| l.price.to_string()),
        new_best_ask = ?resolution.asks.first().map(|l| l.price.to_string()),
        "Crossed book detected, removing crossed levels"
    );

    resolution
}

fn uncrossed(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> CrossResolution {
    CrossResolution {
        bids,
        asks,
        removed_bids: 0,
        removed_asks: 0,
    }
}
