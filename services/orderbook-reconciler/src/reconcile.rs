//! Reconciliation state machine for one subscription
//!
//! ```text
//!   Idle ──subscribe──▶ AwaitingSnapshot ──snapshot──▶ Live ◀─┐
//!    ▲                        ▲   │                      │   │ snapshot / update
//!    │                        │   └──────feed error──────┼───┘
//!    │                        │          ▼               │
//!    │                        └─────── Retrying ◀──feed error
//!    └────────── unsubscribe (from any state)
//! ```
//!
//! A snapshot fully replaces the book. An update is applied to the current
//! book through merge → cross repair → depth truncation → cumulative totals,
//! producing a new immutable `OrderBook`; the previous one is never touched.
//! Updates that arrive before the first snapshot are discarded.
//!
//! Malformed level entries are skipped one by one; the rest of the message
//! is still applied.

use std::sync::Arc;

use tracing::{debug, info, warn};
use types::ids::SubscriptionId;
use types::level::{LevelUpdate, PriceLevel};
use types::side::BookSide;

use crate::cross::resolve_crossed;
use crate::depth::with_cumulative_totals;
use crate::error::FeedError;
use crate::events::{BookMessage, MessageKind};
use crate::feed::SubscriptionKey;
use crate::level_set::{build_levels, merge_levels, truncate_levels};
use crate::metrics::ReconcilerMetrics;
use crate::order_book::OrderBook;

/// Lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcilerState {
    /// No active subscription.
    Idle,
    /// Subscribed, waiting for the first snapshot.
    AwaitingSnapshot,
    /// Snapshot applied, processing updates.
    Live,
    /// Feed failed; a re-subscribe is pending.
    Retrying,
}

/// What the consumer sees for one subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookView {
    /// Latest reconciled book, `None` until the first snapshot.
    pub order_book: Option<Arc<OrderBook>>,
    /// True from subscribe until a snapshot is applied.
    pub loading: bool,
    /// Set only while retrying after a feed error.
    pub error: Option<FeedError>,
}

/// Result of handing one message to the reconciler
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Book replaced by a snapshot.
    Snapshot(Arc<OrderBook>),
    /// Update applied, new book derived.
    Update(Arc<OrderBook>),
    /// Update received before any snapshot.
    Discarded,
    /// Not subscribed, or message for another symbol.
    Ignored,
}

impl ApplyOutcome {
    /// The new book, if one was produced.
    pub fn book(&self) -> Option<&Arc<OrderBook>> {
        match self {
            ApplyOutcome::Snapshot(book) | ApplyOutcome::Update(book) => Some(book),
            ApplyOutcome::Discarded | ApplyOutcome::Ignored => None,
        }
    }
}

/// Book state and lifecycle of one (symbol, depth) subscription
pub struct BookReconciler {
    key: SubscriptionKey,
    state: ReconcilerState,
    book: Option<Arc<OrderBook>>,
    last_error: Option<FeedError>,
    subscription: Option<SubscriptionId>,
    metrics: Arc<ReconcilerMetrics>,
}

impl BookReconciler {
    pub fn new(key: SubscriptionKey, metrics: Arc<ReconcilerMetrics>) -> Self {
        Self {
            key,
            state: ReconcilerState::Idle,
            book: None,
            last_error: None,
            subscription: None,
            metrics,
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    /// Current book, kept across retry cycles.
    pub fn book(&self) -> Option<&Arc<OrderBook>> {
        self.book.as_ref()
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    /// Identifier of the current feed subscription attempt.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    /// Start (or restart after an error) a feed subscription.
    ///
    /// Clears the surfaced error. The last good book stays visible until
    /// the next snapshot replaces it.
    pub fn subscribe(&mut self) -> SubscriptionId {
        let id = SubscriptionId::new();
        if self.state == ReconcilerState::Retrying {
            self.metrics.record_retry();
        }

        self.state = ReconcilerState::AwaitingSnapshot;
        self.last_error = None;
        self.subscription = Some(id);

        info!(
            key = %self.key,
            subscription_id = %id,
            "Subscribing to order book"
        );
        id
    }

    /// Apply one feed message.
    pub fn apply(&mut self, message: &BookMessage) -> ApplyOutcome {
        if matches!(self.state, ReconcilerState::Idle | ReconcilerState::Retrying) {
            debug!(key = %self.key, state = ?self.state, "Message ignored, not subscribed");
            return ApplyOutcome::Ignored;
        }

        if message.symbol != self.key.symbol {
            warn!(
                key = %self.key,
                symbol = %message.symbol,
                "Message for another symbol ignored"
            );
            return ApplyOutcome::Ignored;
        }

        match message.kind {
            MessageKind::Snapshot => ApplyOutcome::Snapshot(self.apply_snapshot(message)),
            MessageKind::Update => match self.book.clone() {
                Some(current) if self.state == ReconcilerState::Live => {
                    ApplyOutcome::Update(self.apply_update(&current, message))
                }
                _ => {
                    self.metrics.record_discarded_delta();
                    debug!(key = %self.key, "Update before snapshot discarded");
                    ApplyOutcome::Discarded
                }
            },
        }
    }

    /// Record a feed failure and enter `Retrying`.
    pub fn on_feed_error(&mut self, error: FeedError) {
        self.metrics.record_feed_error();
        warn!(
            key = %self.key,
            subscription_id = ?self.subscription.map(|id| id.to_string()),
            error = %error,
            "Order book feed error, will retry"
        );
        self.state = ReconcilerState::Retrying;
        self.last_error = Some(error);
        self.subscription = None;
    }

    /// Tear down: discard all book state and return to `Idle`.
    pub fn unsubscribe(&mut self) {
        if self.state != ReconcilerState::Idle {
            info!(key = %self.key, "Unsubscribed from order book");
        }
        self.state = ReconcilerState::Idle;
        self.book = None;
        self.last_error = None;
        self.subscription = None;
    }

    /// Consumer-facing view of the current state.
    pub fn view(&self) -> BookView {
        BookView {
            order_book: self.book.clone(),
            loading: self.state == ReconcilerState::AwaitingSnapshot,
            error: match self.state {
                ReconcilerState::Retrying => self.last_error.clone(),
                _ => None,
            },
        }
    }

    fn apply_snapshot(&mut self, message: &BookMessage) -> Arc<OrderBook> {
        let bids = build_levels(&self.parse_side(message, BookSide::Bid), BookSide::Bid);
        let asks = build_levels(&self.parse_side(message, BookSide::Ask), BookSide::Ask);

        let book = Arc::new(self.finish(message, bids, asks));
        self.metrics.record_snapshot();
        info!(
            key = %self.key,
            bids = book.bids().len(),
            asks = book.asks().len(),
            checksum = book.checksum(),
            "Order book snapshot applied"
        );

        self.state = ReconcilerState::Live;
        self.last_error = None;
        self.book = Some(Arc::clone(&book));
        book
    }

    fn apply_update(&mut self, current: &OrderBook, message: &BookMessage) -> Arc<OrderBook> {
        let bid_updates = self.parse_side(message, BookSide::Bid);
        let ask_updates = self.parse_side(message, BookSide::Ask);

        let bids = merge_levels(current.bids(), &bid_updates, BookSide::Bid);
        let asks = merge_levels(current.asks(), &ask_updates, BookSide::Ask);

        let book = Arc::new(self.finish(message, bids, asks));
        self.metrics.record_delta();
        debug!(
            key = %self.key,
            bid_changes = bid_updates.len(),
            ask_changes = ask_updates.len(),
            best_bid = ?book.best_bid().map(|l| l.price.to_string()),
            best_ask = ?book.best_ask().map(|l| l.price.to_string()),
            "Order book update applied"
        );

        self.book = Some(Arc::clone(&book));
        book
    }

    /// Cross repair, depth bound and totals, shared by snapshots and updates.
    fn finish(
        &self,
        message: &BookMessage,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> OrderBook {
        let resolution = resolve_crossed(bids, asks);
        if resolution.was_crossed() {
            self.metrics
                .record_crossed(resolution.removed_bids, resolution.removed_asks);
        }

        let depth = self.key.depth.levels();
        let bids = truncate_levels(resolution.bids, depth);
        let asks = truncate_levels(resolution.asks, depth);

        OrderBook::new(
            self.key.symbol.clone(),
            with_cumulative_totals(&bids),
            with_cumulative_totals(&asks),
            message.timestamp,
            message.checksum,
        )
    }

    fn parse_side(&self, message: &BookMessage, side: BookSide) -> Vec<LevelUpdate> {
        let parsed = message.parse_side(side);
        if !parsed.rejected.is_empty() {
            self.metrics.record_skipped_entries(parsed.rejected.len());
            for err in &parsed.rejected {
                warn!(key = %self.key, side = %side, error = %err, "Skipping malformed level entry");
            }
        }
        parsed.updates
    }
}
