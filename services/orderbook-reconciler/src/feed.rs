//! Market-data feed contract
//!
//! The reconciler consumes the feed through [`BookFeed`]: one call per
//! subscription attempt returns an ordered stream of book messages. The
//! transport behind it (websocket client, replay file, test harness) is not
//! the reconciler's concern.
//!
//! [`ChannelFeed`] is the in-process implementation used for embedding and by
//! the test-suite.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use types::ids::MarketId;
use types::side::BookDepth;

use crate::error::FeedError;
use crate::events::BookMessage;

/// One item delivered by a feed stream
pub type FeedItem = Result<BookMessage, FeedError>;

/// Ordered stream of book messages for one subscription
pub type FeedStream = BoxStream<'static, FeedItem>;

/// Composite identity of a book subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub symbol: MarketId,
    pub depth: BookDepth,
}

impl SubscriptionKey {
    pub fn new(symbol: MarketId, depth: BookDepth) -> Self {
        Self { symbol, depth }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.depth)
    }
}

/// Source of order book messages.
///
/// Each successful `subscribe` must yield a snapshot followed by updates, in
/// delivery order. Dropping the returned stream ends the subscription.
#[async_trait]
pub trait BookFeed: Send + Sync + 'static {
    async fn subscribe(&self, key: &SubscriptionKey) -> Result<FeedStream, FeedError>;
}

/// Items kept per key while no subscriber is attached. The oldest item is
/// dropped once the backlog is full.
pub const MAX_BACKLOG: usize = 1024;

#[derive(Default)]
struct Route {
    sender: Option<mpsc::UnboundedSender<FeedItem>>,
    /// Items pushed while no subscriber was attached.
    backlog: VecDeque<FeedItem>,
    subscriptions: u64,
    reject_next: Option<FeedError>,
}

/// In-process feed backed by tokio channels, one route per subscription key.
#[derive(Default)]
pub struct ChannelFeed {
    routes: DashMap<SubscriptionKey, Route>,
}

impl ChannelFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to the current subscriber of `key`, or queue it
    /// for the next one.
    pub fn push(&self, key: &SubscriptionKey, message: BookMessage) {
        self.deliver(key, Ok(message));
    }

    /// Fail the current stream of `key` with a transport error.
    pub fn fail(&self, key: &SubscriptionKey, error: FeedError) {
        self.deliver(key, Err(error));
    }

    /// End the current stream of `key` without an error item and discard
    /// anything queued for it.
    pub fn close(&self, key: &SubscriptionKey) {
        if let Some(mut route) = self.routes.get_mut(key) {
            route.sender = None;
            route.backlog.clear();
        }
    }

    /// Make the next `subscribe` for `key` fail with `error`.
    pub fn reject_next_subscribe(&self, key: &SubscriptionKey, error: FeedError) {
        self.routes.entry(key.clone()).or_default().reject_next = Some(error);
    }

    /// Number of `subscribe` calls made for `key`, rejected ones included.
    pub fn subscribe_count(&self, key: &SubscriptionKey) -> u64 {
        self.routes.get(key).map(|r| r.subscriptions).unwrap_or(0)
    }

    /// Whether a subscriber is currently attached to `key`.
    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.routes
            .get(key)
            .and_then(|r| r.sender.as_ref().map(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    /// Items queued for the next subscriber of `key`.
    pub fn backlog_len(&self, key: &SubscriptionKey) -> usize {
        self.routes.get(key).map(|r| r.backlog.len()).unwrap_or(0)
    }

    fn deliver(&self, key: &SubscriptionKey, item: FeedItem) {
        let mut route = self.routes.entry(key.clone()).or_default();
        let item = match route.sender.as_ref() {
            Some(tx) => match tx.send(item) {
                Ok(()) => return,
                Err(mpsc::error::SendError(item)) => item,
            },
            None => item,
        };
        // Subscriber gone; keep the item for the next one.
        route.sender = None;
        if route.backlog.len() >= MAX_BACKLOG {
            route.backlog.pop_front();
            warn!(key = %key, limit = MAX_BACKLOG, "Feed backlog full, oldest item dropped");
        }
        route.backlog.push_back(item);
    }
}

#[async_trait]
impl BookFeed for ChannelFeed {
    async fn subscribe(&self, key: &SubscriptionKey) -> Result<FeedStream, FeedError> {
        let mut route = self.routes.entry(key.clone()).or_default();
        route.subscriptions += 1;

        if let Some(err) = route.reject_next.take() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let backlog = std::mem::take(&mut route.backlog);
        debug!(key = %key, queued = backlog.len(), "Channel feed subscribed");
        for item in backlog {
            // Receiver is alive in this scope.
            let _ = tx.send(item);
        }
        route.sender = Some(tx);

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key() -> SubscriptionKey {
        SubscriptionKey::new(MarketId::new("BTC/USD"), BookDepth::D10)
    }

    fn snapshot() -> BookMessage {
        BookMessage::snapshot(MarketId::new("BTC/USD"), Utc::now(), 1, vec![], vec![])
    }

    #[test]
    fn test_key_display_and_equality() {
        let a = key();
        let b = SubscriptionKey::new(MarketId::new("BTC/USD"), BookDepth::D25);
        assert_eq!(a.to_string(), "BTC/USD@10");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_backlog_is_delivered_on_subscribe() {
        let feed = ChannelFeed::new();
        feed.push(&key(), snapshot());

        let mut stream = feed.subscribe(&key()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.checksum, 1);
        assert_eq!(feed.subscribe_count(&key()), 1);
        assert!(feed.is_subscribed(&key()));
    }

    #[tokio::test]
    async fn test_fail_and_close() {
        let feed = ChannelFeed::new();
        let mut stream = feed.subscribe(&key()).await.unwrap();

        feed.fail(&key(), FeedError::Transport("reset".into()));
        assert_eq!(
            stream.next().await.unwrap(),
            Err(FeedError::Transport("reset".into()))
        );

        feed.close(&key());
        assert!(stream.next().await.is_none());
        assert!(!feed.is_subscribed(&key()));
    }

    #[tokio::test]
    async fn test_rejected_subscribe() {
        let feed = ChannelFeed::new();
        feed.reject_next_subscribe(&key(), FeedError::Subscribe("unknown pair".into()));

        assert!(feed.subscribe(&key()).await.is_err());
        assert!(feed.subscribe(&key()).await.is_ok());
        assert_eq!(feed.subscribe_count(&key()), 2);
    }

    #[tokio::test]
    async fn test_push_after_subscriber_dropped_is_queued() {
        let feed = ChannelFeed::new();
        let stream = feed.subscribe(&key()).await.unwrap();
        drop(stream);

        feed.push(&key(), snapshot());
        assert!(!feed.is_subscribed(&key()));

        let mut stream = feed.subscribe(&key()).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_backlog_keeps_latest_items() {
        let feed = ChannelFeed::new();
        let extra = 5;
        for checksum in 0..(MAX_BACKLOG + extra) as u32 {
            feed.push(
                &key(),
                BookMessage::snapshot(MarketId::new("BTC/USD"), Utc::now(), checksum, vec![], vec![]),
            );
        }
        assert_eq!(feed.backlog_len(&key()), MAX_BACKLOG);

        let mut stream = feed.subscribe(&key()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.checksum, extra as u32);
        assert_eq!(feed.backlog_len(&key()), 0);
    }

    #[tokio::test]
    async fn test_close_discards_backlog() {
        let feed = ChannelFeed::new();
        let stream = feed.subscribe(&key()).await.unwrap();
        drop(stream);

        feed.push(&key(), snapshot());
        assert_eq!(feed.backlog_len(&key()), 1);

        feed.close(&key());
        assert_eq!(feed.backlog_len(&key()), 0);
    }
}
