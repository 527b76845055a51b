//! Conversion metrics.
//!
//! Tracks request outcomes, per-shape skips, and cache effectiveness.
//! Thread-safe via atomics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Conversion metrics collector.
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    /// Total conversion requests started.
    pub conversions_started: AtomicU64,
    /// Total conversion requests completed successfully.
    pub conversions_succeeded: AtomicU64,
    /// Total conversion requests that failed.
    pub conversions_failed: AtomicU64,
    /// Individual shapes exported to artifacts.
    pub shapes_converted: AtomicU64,
    /// Individual shapes skipped under the tolerant policy.
    pub shapes_skipped: AtomicU64,
    /// Artifact cache hits (conversion skipped).
    pub cache_hits: AtomicU64,
    /// Artifact cache misses (exporter invoked).
    pub cache_misses: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub conversions_started: u64,
    pub conversions_succeeded: u64,
    pub conversions_failed: u64,
    pub shapes_converted: u64,
    pub shapes_skipped: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ConversionMetrics {
    /// Create a new empty metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a conversion request start.
    pub fn record_started(&self) {
        self.conversions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful conversion request.
    pub fn record_succeeded(&self) {
        self.conversions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed conversion request.
    pub fn record_failed(&self) {
        self.conversions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one exported shape.
    pub fn record_shape_converted(&self) {
        self.shapes_converted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one shape skipped under the tolerant policy.
    pub fn record_shape_skipped(&self) {
        self.shapes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an artifact cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an artifact cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            conversions_started: self.conversions_started.load(Ordering::Relaxed),
            conversions_succeeded: self.conversions_succeeded.load(Ordering::Relaxed),
            conversions_failed: self.conversions_failed.load(Ordering::Relaxed),
            shapes_converted: self.shapes_converted.load(Ordering::Relaxed),
            shapes_skipped: self.shapes_skipped.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ConversionMetrics::new();
        metrics.record_started();
        metrics.record_shape_converted();
        metrics.record_shape_converted();
        metrics.record_cache_hit();
        metrics.record_succeeded();

        let snap = metrics.snapshot();
        assert_eq!(snap.conversions_started, 1);
        assert_eq!(snap.shapes_converted, 2);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.conversions_failed, 0);
    }
}
