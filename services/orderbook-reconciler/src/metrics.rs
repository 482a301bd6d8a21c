//! Reconciler metrics
//!
//! Lock-free counters shared by every session of a service. `snapshot()`
//! copies them into a plain serializable struct for export.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters shared across all subscriptions of one service
#[derive(Debug, Default)]
pub struct ReconcilerMetrics {
    snapshots_applied: AtomicU64,
    deltas_applied: AtomicU64,
    /// Deltas that arrived before the first snapshot.
    deltas_discarded: AtomicU64,
    /// Malformed level entries skipped during parsing.
    entries_skipped: AtomicU64,
    crossed_bids_removed: AtomicU64,
    crossed_asks_removed: AtomicU64,
    publications: AtomicU64,
    feed_errors: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of [`ReconcilerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub snapshots_applied: u64,
    pub deltas_applied: u64,
    pub deltas_discarded: u64,
    pub entries_skipped: u64,
    pub crossed_bids_removed: u64,
    pub crossed_asks_removed: u64,
    pub publications: u64,
    pub feed_errors: u64,
    pub retries: u64,
}

impl ReconcilerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&self) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delta(&self) {
        self.deltas_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_delta(&self) {
        self.deltas_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_entries(&self, count: usize) {
        if count > 0 {
            self.entries_skipped.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Record levels removed by crossed-book repair.
    pub fn record_crossed(&self, removed_bids: usize, removed_asks: usize) {
        self.crossed_bids_removed
            .fetch_add(removed_bids as u64, Ordering::Relaxed);
        self.crossed_asks_removed
            .fetch_add(removed_asks as u64, Ordering::Relaxed);
    }

    pub fn record_publication(&self) {
        self.publications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feed_error(&self) {
        self.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            deltas_applied: self.deltas_applied.load(Ordering::Relaxed),
            deltas_discarded: self.deltas_discarded.load(Ordering::Relaxed),
            entries_skipped: self.entries_skipped.load(Ordering::Relaxed),
            crossed_bids_removed: self.crossed_bids_removed.load(Ordering::Relaxed),
            crossed_asks_removed: self.crossed_asks_removed.load(Ordering::Relaxed),
            publications: self.publications.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Export as a name → value map for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<&'static str, u64> {
        let mut m = BTreeMap::new();
        m.insert("snapshots_applied", self.snapshots_applied);
        m.insert("deltas_applied", self.deltas_applied);
        m.insert("deltas_discarded", self.deltas_discarded);
        m.insert("entries_skipped", self.entries_skipped);
        m.insert("crossed_bids_removed", self.crossed_bids_removed);
        m.insert("crossed_asks_removed", self.crossed_asks_removed);
        m.insert("publications", self.publications);
        m.insert("feed_errors", self.feed_errors);
        m.insert("retries", self.retries);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ReconcilerMetrics::new();

        metrics.record_snapshot();
        metrics.record_delta();
        metrics.record_delta();
        metrics.record_discarded_delta();
        metrics.record_crossed(3, 1);
        metrics.record_skipped_entries(2);
        metrics.record_skipped_entries(0);

        let snap = metrics.snapshot();
        assert_eq!(snap.snapshots_applied, 1);
        assert_eq!(snap.deltas_applied, 2);
        assert_eq!(snap.deltas_discarded, 1);
        assert_eq!(snap.crossed_bids_removed, 3);
        assert_eq!(snap.crossed_asks_removed, 1);
        assert_eq!(snap.entries_skipped, 2);
    }

    #[test]
    fn test_metrics_export() {
        let metrics = ReconcilerMetrics::new();
        metrics.record_publication();
        metrics.record_feed_error();
        metrics.record_retry();

        let exported = metrics.snapshot().export();
        assert_eq!(exported["publications"], 1);
        assert_eq!(exported["feed_errors"], 1);
        assert_eq!(exported["retries"], 1);
        assert_eq!(exported["snapshots_applied"], 0);
        assert_eq!(exported.len(), 9);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = ReconcilerMetrics::new();
        metrics.record_snapshot();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"snapshots_applied\":1"));
    }
}
