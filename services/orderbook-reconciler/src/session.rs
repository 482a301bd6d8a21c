//! Per-subscription task
//!
//! One session owns the reconciler and the throttle of a single
//! `SubscriptionKey` and processes its feed stream strictly in order. It waits
//! on a stop signal, on its receivers going away, on the trailing publication
//! deadline and on the next feed item, in that priority.
//!
//! On a feed error the session surfaces the error, sleeps for the retry
//! delay and subscribes again. A stop signal interrupts any wait.
//!
//! A session also stops on its own once every `watch` receiver has been
//! dropped, so a consumer that goes away without unsubscribing does not keep
//! the feed subscription alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{watch, Notify};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use crate::config::ReconcilerConfig;
use crate::error::FeedError;
use crate::events::BookMessage;
use crate::feed::{BookFeed, FeedStream, SubscriptionKey};
use crate::metrics::ReconcilerMetrics;
use crate::reconcile::{ApplyOutcome, BookReconciler, BookView};
use crate::throttle::{PublishDecision, PublishThrottle};

/// Stop switch shared between a session and its owner
#[derive(Debug)]
pub struct SessionControl {
    active: AtomicBool,
    stop: Notify,
    // Serializes handing out receivers against the unobserved check.
    gate: Mutex<()>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            stop: Notify::new(),
            gate: Mutex::new(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deactivate the session. No message is applied or published afterwards.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        // Stores a permit if the session is not waiting right now.
        self.stop.notify_one();
    }

    /// New receiver on `view_tx`, or None once the session has stopped.
    pub fn attach(&self, view_tx: &watch::Sender<BookView>) -> Option<watch::Receiver<BookView>> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_active() {
            return None;
        }
        Some(view_tx.subscribe())
    }

    /// Deactivate if `view_tx` has no receivers left. Returns true if it did.
    fn release_if_unobserved(&self, view_tx: &watch::Sender<BookView>) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if view_tx.receiver_count() > 0 {
            return false;
        }
        self.active.store(false, Ordering::Release);
        true
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a feed stream stopped being driven
enum StreamEnd {
    Stopped,
    Failed(FeedError),
}

pub struct Session<F: BookFeed> {
    feed: Arc<F>,
    reconciler: BookReconciler,
    throttle: PublishThrottle,
    retry_delay: Duration,
    view_tx: Arc<watch::Sender<BookView>>,
    control: Arc<SessionControl>,
    metrics: Arc<ReconcilerMetrics>,
}

impl<F: BookFeed> Session<F> {
    pub fn new(
        key: SubscriptionKey,
        feed: Arc<F>,
        config: &ReconcilerConfig,
        metrics: Arc<ReconcilerMetrics>,
        view_tx: Arc<watch::Sender<BookView>>,
        control: Arc<SessionControl>,
    ) -> Self {
        Self {
            feed,
            reconciler: BookReconciler::new(key, Arc::clone(&metrics)),
            throttle: PublishThrottle::new(config.publish_interval()),
            retry_delay: config.retry_delay(),
            view_tx,
            control,
            metrics,
        }
    }

    /// Subscribe, reconcile and retry until stopped.
    pub async fn run(mut self) {
        let control = Arc::clone(&self.control);
        let view_tx = Arc::clone(&self.view_tx);

        while control.is_active() {
            self.reconciler.subscribe();
            self.throttle.reset();
            self.publish();

            let end = match self.feed.subscribe(self.reconciler.key()).await {
                Ok(stream) => self.drive(stream).await,
                Err(err) => StreamEnd::Failed(err),
            };

            let err = match end {
                StreamEnd::Stopped => break,
                StreamEnd::Failed(err) => err,
            };
            if !control.is_active() {
                break;
            }

            self.reconciler.on_feed_error(err);
            self.throttle.reset();
            self.publish();

            let retry = sleep(self.retry_delay);
            tokio::pin!(retry);
            let stopped = loop {
                tokio::select! {
                    biased;
                    _ = control.stop.notified() => break true,
                    _ = view_tx.closed() => {
                        if self.release_unobserved() {
                            break true;
                        }
                    }
                    _ = &mut retry => break false,
                }
            };
            if stopped {
                break;
            }
        }

        info!(key = %self.reconciler.key(), "Book session stopped");
        self.reconciler.unsubscribe();
    }

    async fn drive(&mut self, mut stream: FeedStream) -> StreamEnd {
        let control = Arc::clone(&self.control);
        let view_tx = Arc::clone(&self.view_tx);

        loop {
            let deadline = self.throttle.trailing_deadline();

            tokio::select! {
                biased;
                _ = control.stop.notified() => return StreamEnd::Stopped,
                _ = view_tx.closed() => {
                    if self.release_unobserved() {
                        return StreamEnd::Stopped;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.throttle.on_trailing_fired(Instant::now()) {
                        self.publish();
                    }
                }
                item = stream.next() => match item {
                    Some(Ok(message)) => {
                        if !control.is_active() {
                            return StreamEnd::Stopped;
                        }
                        self.handle_message(&message);
                    }
                    Some(Err(err)) => return StreamEnd::Failed(err),
                    None => return StreamEnd::Failed(FeedError::Closed),
                },
            }
        }
    }

    fn handle_message(&mut self, message: &BookMessage) {
        let now = Instant::now();

        match self.reconciler.apply(message) {
            ApplyOutcome::Snapshot(_) => {
                self.throttle.publish_immediately(now);
                self.publish();
            }
            ApplyOutcome::Update(_) => match self.throttle.on_update(now) {
                PublishDecision::Now => self.publish(),
                PublishDecision::ScheduleIn(wait) => {
                    debug!(
                        key = %self.reconciler.key(),
                        wait_ms = wait.as_millis() as u64,
                        "Publication deferred"
                    );
                }
                PublishDecision::AlreadyScheduled => {}
            },
            ApplyOutcome::Discarded | ApplyOutcome::Ignored => {}
        }
    }

    fn release_unobserved(&self) -> bool {
        let released = self.control.release_if_unobserved(&self.view_tx);
        if released {
            info!(key = %self.reconciler.key(), "All observers dropped");
        }
        released
    }

    fn publish(&self) {
        if !self.control.is_active() {
            return;
        }
        self.view_tx.send_replace(self.reconciler.view());
        self.metrics.record_publication();
    }
}
