//! Property tests for book invariants under arbitrary message sequences.
//!
//! For every reachable book:
//! - bids strictly descending, asks strictly ascending
//! - best bid below best ask
//! - each side within the subscribed depth
//! - cumulative totals equal the running quantity sum
//!
//! Replaying the same sequence twice yields the same book.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use orderbook_reconciler::level_set::{merge_levels, validate_levels_sorting, validate_spread};
use orderbook_reconciler::metrics::ReconcilerMetrics;
use orderbook_reconciler::{BookMessage, BookReconciler, OrderBook, RawLevel, SubscriptionKey};
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::ids::MarketId;
use types::level::{LevelUpdate, PriceLevel};
use types::numeric::{Price, Quantity};
use types::side::{BookDepth, BookSide};

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-12-03T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// (price, qty) with qty in tenths; zero means removal.
fn level_strategy() -> impl Strategy<Value = (u64, u64)> {
    (90u64..=130, prop_oneof![Just(0u64), 1u64..50])
}

fn side_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec(level_strategy(), 0..15)
}

#[derive(Debug, Clone)]
enum Step {
    Snapshot(Vec<(u64, u64)>, Vec<(u64, u64)>),
    Update(Vec<(u64, u64)>, Vec<(u64, u64)>),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => (side_strategy(), side_strategy()).prop_map(|(b, a)| Step::Snapshot(b, a)),
        6 => (side_strategy(), side_strategy()).prop_map(|(b, a)| Step::Update(b, a)),
    ]
}

fn raw(levels: &[(u64, u64)]) -> Vec<RawLevel> {
    levels
        .iter()
        .map(|(p, q)| RawLevel::new(p.to_string(), Decimal::new(*q as i64, 1).to_string()))
        .collect()
}

fn message(step: &Step) -> BookMessage {
    let symbol = MarketId::new("BTC/USD");
    match step {
        Step::Snapshot(b, a) => BookMessage::snapshot(symbol, ts(), 0, raw(b), raw(a)),
        Step::Update(b, a) => BookMessage::update(symbol, ts(), 0, raw(b), raw(a)),
    }
}

fn replay(steps: &[Step], depth: BookDepth) -> (BookReconciler, Vec<Arc<OrderBook>>) {
    let key = SubscriptionKey::new(MarketId::new("BTC/USD"), depth);
    let mut reconciler = BookReconciler::new(key, Arc::new(ReconcilerMetrics::new()));
    reconciler.subscribe();

    let mut books = Vec::new();
    for step in steps {
        if let Some(book) = reconciler.apply(&message(step)).book() {
            books.push(Arc::clone(book));
        }
    }
    (reconciler, books)
}

fn assert_totals(levels: &[PriceLevel]) -> Result<(), TestCaseError> {
    let mut running = Quantity::ZERO;
    for level in levels {
        running += level.quantity;
        prop_assert_eq!(level.total, running);
        prop_assert!(!level.quantity.is_zero());
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_published_books_hold_invariants(
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        let depth = BookDepth::D10;
        let (_, books) = replay(&steps, depth);

        for book in &books {
            prop_assert!(validate_levels_sorting(book.bids(), BookSide::Bid));
            prop_assert!(validate_levels_sorting(book.asks(), BookSide::Ask));
            prop_assert!(!book.is_crossed());
            let (best_bid, best_ask) = book.best_prices();
            prop_assert!(validate_spread(best_bid, best_ask));
            prop_assert!(book.bids().len() <= depth.levels());
            prop_assert!(book.asks().len() <= depth.levels());
            assert_totals(book.bids())?;
            assert_totals(book.asks())?;
        }
    }

    #[test]
    fn prop_replay_deterministic(
        steps in prop::collection::vec(step_strategy(), 1..30),
    ) {
        let (first, _) = replay(&steps, BookDepth::D25);
        let (second, _) = replay(&steps, BookDepth::D25);

        prop_assert_eq!(
            first.book().map(|b| b.as_ref().clone()),
            second.book().map(|b| b.as_ref().clone())
        );
    }

    #[test]
    fn prop_zero_quantity_delete_of_absent_price_is_noop(
        prices in prop::collection::btree_set(1u64..1000, 0..20),
        absent in 1000u64..2000,
    ) {
        let levels: Vec<PriceLevel> = prices
            .iter()
            .rev()
            .map(|p| PriceLevel::new(Price::from_u64(*p), Quantity::try_from(Decimal::ONE).unwrap()))
            .collect();
        let removal = LevelUpdate::new(Price::from_u64(absent), Quantity::ZERO);

        let merged = merge_levels(&levels, &[removal], BookSide::Bid);
        prop_assert_eq!(merged, levels);
    }

    #[test]
    fn prop_merge_keeps_side_sorted(
        current in prop::collection::btree_set(1u64..500, 0..30),
        updates in prop::collection::vec(level_strategy(), 0..30),
    ) {
        let asks: Vec<PriceLevel> = current
            .iter()
            .map(|p| PriceLevel::new(Price::from_u64(*p), Quantity::try_from(Decimal::ONE).unwrap()))
            .collect();
        let updates: Vec<LevelUpdate> = updates
            .iter()
            .map(|(p, q)| LevelUpdate::new(
                Price::from_u64(*p),
                Quantity::try_from(Decimal::new(*q as i64, 1)).unwrap(),
            ))
            .collect();

        let merged = merge_levels(&asks, &updates, BookSide::Ask);
        prop_assert!(validate_levels_sorting(&merged, BookSide::Ask));
        prop_assert!(merged.iter().all(|l| !l.is_empty()));
    }
}
