//! Price-level merge for one side of a book
//!
//! Merging is a pure function: the current levels are never touched and a
//! freshly built, side-sorted, duplicate-free list is returned. Updates are
//! first collapsed into a `BTreeMap` keyed by price (last write wins), then
//! merged with the already-sorted current levels in a single pass, so a
//! batch costs O(n + m log m) instead of a re-sort of the whole side.
//!
//! Rules per update:
//! - `qty > 0` → insert the level, or replace the one at that price
//! - `qty == 0` → delete the level at that price (no-op when absent)

use std::cmp::Ordering;
use std::collections::BTreeMap;

use types::level::{LevelUpdate, PriceLevel};
use types::numeric::{Price, Quantity};
use types::side::BookSide;

/// Merge a batch of updates into the sorted levels of `side`.
///
/// `current` must already be sorted best price first with unique prices;
/// the result satisfies the same invariant and never contains an empty level.
pub fn merge_levels(
    current: &[PriceLevel],
    updates: &[LevelUpdate],
    side: BookSide,
) -> Vec<PriceLevel> {
    if updates.is_empty() {
        return current.to_vec();
    }

    let mut latest: BTreeMap<Price, Quantity> = BTreeMap::new();
    for update in updates {
        latest.insert(update.price, update.qty);
    }

    // BTreeMap iterates ascending; bids want the highest price first.
    let ordered: Vec<(Price, Quantity)> = match side {
        BookSide::Bid => latest.into_iter().rev().collect(),
        BookSide::Ask => latest.into_iter().collect(),
    };

    let mut merged = Vec::with_capacity(current.len() + ordered.len());
    let mut changes = ordered.into_iter().peekable();

    for level in current {
        // Changes that sort ahead of this level are new levels.
        while let Some(&(price, qty)) = changes.peek() {
            if side.compare(price, level.price) != Ordering::Less {
                break;
            }
            push_non_empty(&mut merged, price, qty);
            changes.next();
        }

        match changes.peek() {
            Some(&(price, qty)) if price == level.price => {
                push_non_empty(&mut merged, price, qty);
                changes.next();
            }
            _ => merged.push(*level),
        }
    }

    for (price, qty) in changes {
        push_non_empty(&mut merged, price, qty);
    }

    merged
}

fn push_non_empty(levels: &mut Vec<PriceLevel>, price: Price, qty: Quantity) {
    if !qty.is_zero() {
        levels.push(PriceLevel::new(price, qty));
    }
}

/// Build a side from scratch, e.g. from a snapshot.
pub fn build_levels(updates: &[LevelUpdate], side: BookSide) -> Vec<PriceLevel> {
    merge_levels(&[], updates, side)
}

/// Keep only the best `depth` levels.
pub fn truncate_levels(mut levels: Vec<PriceLevel>, depth: usize) -> Vec<PriceLevel> {
    levels.truncate(depth);
    levels
}

/// Whether `levels` are strictly ordered best price first for `side`.
pub fn validate_levels_sorting(levels: &[PriceLevel], side: BookSide) -> bool {
    levels
        .windows(2)
        .all(|pair| side.is_better(pair[0].price, pair[1].price))
}

/// A spread is valid unless both prices are present and the bid is above the ask.
pub fn validate_spread(best_bid: Option<Price>, best_ask: Option<Price>) -> bool {
    match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => bid <= ask,
        _ => true,
    }
}
