//! Order Book Reconciler
//!
//! Consumes a snapshot followed by incremental price-level updates from a
//! market-data feed and maintains, per (symbol, depth) subscription:
//! - Bid/ask sides kept sorted and duplicate free
//! - Crossed-book repair on every step
//! - Depth bound and cumulative depth totals
//! - Throttled publication of immutable book views
//! - Retry after feed errors
//!
//! # Architecture
//!
//! ```text
//!   BookFeed (snapshot + updates)
//!        │
//!   ┌────▼─────┐
//!   │ Session  │  ← one task per key, strictly ordered
//!   └────┬─────┘
//!        │
//!   ┌────▼───────────────────────────────────────┐
//!   │ BookReconciler                             │
//!   │  merge ─▶ cross repair ─▶ truncate ─▶ totals│
//!   └────┬───────────────────────────────────────┘
//!        │  Arc<OrderBook>
//!   ┌────▼─────┐
//!   │ Throttle │  ← ≤ 1 publication per interval, trailing flush
//!   └────┬─────┘
//!        │
//!   watch::Receiver<BookView>  (BookService::observe)
//! ```

pub mod config;
pub mod cross;
pub mod depth;
pub mod error;
pub mod events;
pub mod feed;
pub mod level_set;
pub mod metrics;
pub mod order_book;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod throttle;

pub use config::ReconcilerConfig;
pub use error::{ConfigError, FeedError};
pub use events::{BookMessage, MessageKind, RawLevel};
pub use feed::{BookFeed, ChannelFeed, FeedStream, SubscriptionKey};
pub use order_book::OrderBook;
pub use reconcile::{BookReconciler, BookView, ReconcilerState};
pub use service::BookService;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
