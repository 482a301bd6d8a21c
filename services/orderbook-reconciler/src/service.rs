//! Consumer-facing order book service
//!
//! `observe(symbol, depth)` returns a `watch` receiver of [`BookView`]s.
//! Each (symbol, depth) key has at most one live session; observing a key
//! twice shares that session. Sessions run as independent tokio tasks and
//! never share book state.
//!
//! Every `observe` counts as one observer of its key. `unsubscribe` releases
//! one observer, and the session stops when the last one is released. A
//! session whose receivers are all dropped stops by itself and its entry is
//! pruned on the next `observe`.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use types::ids::MarketId;
use types::side::BookDepth;

use crate::config::ReconcilerConfig;
use crate::feed::{BookFeed, SubscriptionKey};
use crate::metrics::{MetricsSnapshot, ReconcilerMetrics};
use crate::reconcile::BookView;
use crate::session::{Session, SessionControl};

struct SessionHandle {
    control: Arc<SessionControl>,
    view_tx: Arc<watch::Sender<BookView>>,
    observers: usize,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn is_running(&self) -> bool {
        self.control.is_active() && !self.task.is_finished()
    }

    fn attach(&mut self) -> Option<watch::Receiver<BookView>> {
        if self.task.is_finished() {
            return None;
        }
        let rx = self.control.attach(&self.view_tx)?;
        self.observers += 1;
        Some(rx)
    }

    fn stop(&self) {
        self.control.stop();
        self.task.abort();
    }
}

/// Registry of live book sessions over one feed
pub struct BookService<F: BookFeed> {
    feed: Arc<F>,
    config: ReconcilerConfig,
    metrics: Arc<ReconcilerMetrics>,
    sessions: DashMap<SubscriptionKey, SessionHandle>,
}

impl<F: BookFeed> BookService<F> {
    pub fn new(feed: Arc<F>, config: ReconcilerConfig) -> Self {
        info!(
            publish_interval_ms = config.publish_interval_ms,
            retry_delay_ms = config.retry_delay_ms,
            default_depth = %config.default_depth,
            "BookService initialized"
        );

        Self {
            feed,
            config,
            metrics: Arc::new(ReconcilerMetrics::new()),
            sessions: DashMap::new(),
        }
    }

    /// Service with default configuration.
    pub fn with_defaults(feed: Arc<F>) -> Self {
        Self::new(feed, ReconcilerConfig::default())
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Watch the reconciled book of `symbol` at `depth`.
    ///
    /// The first view is `loading` with no book. Must be called from within
    /// a Tokio runtime.
    pub fn observe(&self, symbol: MarketId, depth: BookDepth) -> watch::Receiver<BookView> {
        self.prune();
        let key = SubscriptionKey::new(symbol, depth);

        match self.sessions.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if let Some(rx) = entry.get_mut().attach() {
                    debug!(key = %key, observers = entry.get().observers, "Observer added");
                    return rx;
                }
                let (handle, rx) = self.spawn(key);
                entry.insert(handle).stop();
                rx
            }
            Entry::Vacant(entry) => {
                let (handle, rx) = self.spawn(key);
                entry.insert(handle);
                rx
            }
        }
    }

    /// Watch `symbol` at the configured default depth.
    pub fn observe_default(&self, symbol: MarketId) -> watch::Receiver<BookView> {
        self.observe(symbol, self.config.default_depth)
    }

    /// Move from one subscription to another (symbol or depth change).
    ///
    /// The caller's observer of `from` is released before the new key is
    /// observed, so the old session stops first if nobody else watches it.
    pub fn switch(
        &self,
        from: &SubscriptionKey,
        symbol: MarketId,
        depth: BookDepth,
    ) -> watch::Receiver<BookView> {
        if from.symbol != symbol || from.depth != depth {
            self.unsubscribe(&from.symbol, from.depth);
        }
        self.observe(symbol, depth)
    }

    /// Release one observer of `symbol` at `depth`.
    ///
    /// The session stops and its book is discarded when the last observer
    /// leaves; its receivers then observe the sender closing. Returns false if
    /// no session existed.
    pub fn unsubscribe(&self, symbol: &MarketId, depth: BookDepth) -> bool {
        let key = SubscriptionKey::new(symbol.clone(), depth);
        let remaining = {
            let Some(mut handle) = self.sessions.get_mut(&key) else {
                return false;
            };
            handle.observers = handle.observers.saturating_sub(1);
            handle.observers
        };

        if remaining > 0 {
            debug!(key = %key, observers = remaining, "Observer released");
            return true;
        }
        if let Some((key, handle)) = self.sessions.remove_if(&key, |_, h| h.observers == 0) {
            handle.stop();
            info!(key = %key, "Book session unsubscribed");
        }
        true
    }

    /// Observers currently counted for `symbol` at `depth`.
    pub fn observer_count(&self, symbol: &MarketId, depth: BookDepth) -> usize {
        let key = SubscriptionKey::new(symbol.clone(), depth);
        self.sessions
            .get(&key)
            .filter(|h| h.is_running())
            .map(|h| h.observers)
            .unwrap_or(0)
    }

    /// Stop every session.
    pub fn shutdown(&self) {
        let keys: Vec<SubscriptionKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.sessions.remove(&key) {
                handle.stop();
            }
        }
        info!("BookService shut down");
    }

    /// Keys with a running session, sorted.
    pub fn active_subscriptions(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> = self
            .sessions
            .iter()
            .filter(|e| e.value().is_running())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_observing(&self, symbol: &MarketId, depth: BookDepth) -> bool {
        let key = SubscriptionKey::new(symbol.clone(), depth);
        self.sessions
            .get(&key)
            .map(|h| h.is_running())
            .unwrap_or(false)
    }

    /// Shared counters, for callers that export them elsewhere.
    pub fn metrics(&self) -> Arc<ReconcilerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop entries of sessions that stopped by themselves.
    fn prune(&self) {
        self.sessions.retain(|key, handle| {
            let running = handle.is_running();
            if !running {
                debug!(key = %key, "Pruned stopped session");
            }
            running
        });
    }

    fn spawn(&self, key: SubscriptionKey) -> (SessionHandle, watch::Receiver<BookView>) {
        let (view_tx, view_rx) = watch::channel(BookView {
            loading: true,
            ..BookView::default()
        });
        let view_tx = Arc::new(view_tx);
        let control = Arc::new(SessionControl::new());

        let session = Session::new(
            key.clone(),
            Arc::clone(&self.feed),
            &self.config,
            Arc::clone(&self.metrics),
            Arc::clone(&view_tx),
            Arc::clone(&control),
        );

        info!(key = %key, "Book session started");
        let handle = SessionHandle {
            control,
            view_tx,
            observers: 1,
            task: tokio::spawn(session.run()),
        };
        (handle, view_rx)
    }
}

impl<F: BookFeed> Drop for BookService<F> {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().stop();
        }
    }
}
