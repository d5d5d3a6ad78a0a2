// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Lightweight observability for ixbase.
//!
//! ixbase does not depend on a logging crate; it observes itself the same
//! way its storage/config neighbors do — a small, thread-safe in-memory
//! collector that embedders can poll or periodically drain.
//!
//! ## Quick Start
//!
//! ```rust
//! use ixbase::metrics::MetricsCollector;
//!
//! let collector = MetricsCollector::global();
//! collector.clear();
//! collector.record_cache_hit();
//! collector.record_commit();
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.cache_hits, 1);
//! assert_eq!(snapshot.commits, 1);
//! ```

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters for one [`crate::tree::Tree`] process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub node_reads: u64,
    pub node_writes: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups that were satisfied without a storage read.
    ///
    /// ## Output
    /// - `0.0` when no lookups have been recorded yet.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Global, process-wide metrics singleton.
///
/// Uses atomics rather than a `RwLock<Vec<Metric>>`: ixbase's counters are
/// simple monotonic tallies, not a time series, so there is nothing to
/// buffer or flush.
pub struct MetricsCollector {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    node_reads: AtomicU64,
    node_writes: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

static GLOBAL: OnceCell<MetricsCollector> = OnceCell::new();

impl MetricsCollector {
    fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            node_reads: AtomicU64::new(0),
            node_writes: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    /// Returns the process-wide singleton, creating it on first access.
    pub fn global() -> &'static MetricsCollector {
        GLOBAL.get_or_init(Self::new)
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_read(&self) {
        self.node_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_write(&self) {
        self.node_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of all counters. Not transactional
    /// across fields — acceptable for an observability-only signal.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            node_reads: self.node_reads.load(Ordering::Relaxed),
            node_writes: self.node_writes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero. Intended for test isolation; tests that
    /// call this should be marked `#[serial]` since the collector is a
    /// process-wide singleton.
    pub fn clear(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.node_reads.store(0, Ordering::Relaxed);
        self.node_writes.store(0, Ordering::Relaxed);
        self.commits.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn records_cache_hits_and_misses() {
        let collector = MetricsCollector::global();
        collector.clear();
        collector.record_cache_hit();
        collector.record_cache_hit();
        collector.record_cache_miss();

        let snap = collector.snapshot();
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
        assert!((snap.cache_hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    #[serial]
    fn clear_resets_everything() {
        let collector = MetricsCollector::global();
        collector.record_commit();
        collector.clear();
        assert_eq!(collector.snapshot(), MetricsSnapshot::default());
    }
}
