//! Publication throttle
//!
//! Every delta is applied to the book immediately; only the hand-off of the
//! resulting book to the consumer is rate limited. At most one publication
//! happens per interval. An update that arrives inside the interval arms a
//! single trailing publication at `last_publish + interval`; when it fires it
//! publishes whatever book is current at that moment, so further updates
//! while it is armed need no timer of their own.
//!
//! The throttle only makes decisions. The session owns the timer and the book.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// What to do with a freshly reconciled book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    /// Publish it now.
    Now,
    /// A trailing publication was armed and will fire after this delay.
    ScheduleIn(Duration),
    /// A trailing publication is already armed and will pick this book up.
    AlreadyScheduled,
}

/// Rate limiter for book publications of one subscription.
#[derive(Debug, Clone)]
pub struct PublishThrottle {
    interval: Duration,
    last_publish: Option<Instant>,
    trailing_deadline: Option<Instant>,
    /// Total publications decided.
    publications: u64,
    /// Updates folded into an already armed trailing publication.
    coalesced: u64,
}

impl PublishThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_publish: None,
            trailing_deadline: None,
            publications: 0,
            coalesced: 0,
        }
    }

    /// Record an unconditional publication (first snapshot of a subscription).
    ///
    /// Any armed trailing publication is dropped: the book it would have
    /// published is the one being published now.
    pub fn publish_immediately(&mut self, now: Instant) {
        self.mark_published(now);
    }

    /// Decide how to publish a book reconciled at `now`.
    pub fn on_update(&mut self, now: Instant) -> PublishDecision {
        let last = match self.last_publish {
            Some(last) => last,
            None => {
                self.mark_published(now);
                return PublishDecision::Now;
            }
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.interval {
            self.mark_published(now);
            return PublishDecision::Now;
        }

        if self.trailing_deadline.is_some() {
            self.coalesced += 1;
            return PublishDecision::AlreadyScheduled;
        }

        let wait = self.interval - elapsed;
        self.trailing_deadline = Some(now + wait);
        trace!(wait_ms = wait.as_millis() as u64, "Trailing publication armed");
        PublishDecision::ScheduleIn(wait)
    }

    /// Deadline of the armed trailing publication, if any.
    pub fn trailing_deadline(&self) -> Option<Instant> {
        self.trailing_deadline
    }

    /// The trailing timer fired. Returns true if a publication is due.
    pub fn on_trailing_fired(&mut self, now: Instant) -> bool {
        if self.trailing_deadline.take().is_none() {
            return false;
        }
        self.mark_published(now);
        true
    }

    /// Forget all timing state and cancel the trailing publication.
    pub fn reset(&mut self) {
        self.last_publish = None;
        self.trailing_deadline = None;
    }

    pub fn publications(&self) -> u64 {
        self.publications
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    fn mark_published(&mut self, now: Instant) {
        self.last_publish = Some(now);
        self.trailing_deadline = None;
        self.publications += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_first_update_publishes_immediately() {
        let mut throttle = PublishThrottle::new(ms(500));
        assert_eq!(throttle.on_update(Instant::now()), PublishDecision::Now);
    }

    #[test]
    fn test_burst_is_coalesced_into_one_trailing_publication() {
        let t0 = Instant::now();
        let mut throttle = PublishThrottle::new(ms(500));

        throttle.publish_immediately(t0); // snapshot

        assert_eq!(throttle.on_update(t0 + ms(100)), PublishDecision::ScheduleIn(ms(400)));
        assert_eq!(throttle.on_update(t0 + ms(200)), PublishDecision::AlreadyScheduled);
        assert_eq!(throttle.on_update(t0 + ms(300)), PublishDecision::AlreadyScheduled);
        assert_eq!(throttle.trailing_deadline(), Some(t0 + ms(500)));

        assert!(throttle.on_trailing_fired(t0 + ms(500)));
        assert_eq!(throttle.trailing_deadline(), None);

        // Next update inside the new window arms a fresh trailer.
        assert_eq!(throttle.on_update(t0 + ms(600)), PublishDecision::ScheduleIn(ms(400)));
        assert_eq!(throttle.trailing_deadline(), Some(t0 + ms(1000)));

        assert_eq!(throttle.publications(), 2);
        assert_eq!(throttle.coalesced(), 2);
    }

    #[test]
    fn test_update_after_interval_publishes_now() {
        let t0 = Instant::now();
        let mut throttle = PublishThrottle::new(ms(500));

        throttle.publish_immediately(t0);
        assert_eq!(throttle.on_update(t0 + ms(500)), PublishDecision::Now);
        assert_eq!(throttle.on_update(t0 + ms(1200)), PublishDecision::Now);
    }

    #[test]
    fn test_late_update_supersedes_armed_trailer() {
        let t0 = Instant::now();
        let mut throttle = PublishThrottle::new(ms(500));

        throttle.publish_immediately(t0);
        throttle.on_update(t0 + ms(100));
        // Timer not serviced yet; an update past the interval publishes directly.
        assert_eq!(throttle.on_update(t0 + ms(700)), PublishDecision::Now);
        assert_eq!(throttle.trailing_deadline(), None);
        assert!(!throttle.on_trailing_fired(t0 + ms(701)));
    }

    #[test]
    fn test_snapshot_cancels_armed_trailer() {
        let t0 = Instant::now();
        let mut throttle = PublishThrottle::new(ms(500));

        throttle.publish_immediately(t0);
        throttle.on_update(t0 + ms(100));
        throttle.publish_immediately(t0 + ms(200));
        assert_eq!(throttle.trailing_deadline(), None);
    }

    #[test]
    fn test_reset_cancels_trailer_and_window() {
        let t0 = Instant::now();
        let mut throttle = PublishThrottle::new(ms(500));

        throttle.publish_immediately(t0);
        throttle.on_update(t0 + ms(100));
        throttle.reset();

        assert_eq!(throttle.trailing_deadline(), None);
        assert!(!throttle.on_trailing_fired(t0 + ms(500)));
        assert_eq!(throttle.on_update(t0 + ms(150)), PublishDecision::Now);
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let t0 = Instant::now();
        let mut throttle = PublishThrottle::new(Duration::ZERO);

        throttle.publish_immediately(t0);
        assert_eq!(throttle.on_update(t0), PublishDecision::Now);
        assert_eq!(throttle.on_update(t0), PublishDecision::Now);
    }
}
