//! # Latency Histograms
//!
//! Fixed-bucket histograms that aggregate client call latencies per
//! operation kind.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Use atomic counters to aggregate samples cheaply.
//! 2. **Fixed Buckets**: Keep histogram buckets in a contiguous array for cache locality.
//! 3. **Plain Snapshots**: Expose snapshots as plain structs detached from the atomics.
//!
//! ## Notes
//! - Bucket boundaries are expressed in microseconds.
//! - The sink keys histograms by the `type:` tag; other tags are ignored here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::sink::LatencySink;

/// Default latency bucket boundaries in microseconds.
///
/// Spans sub-millisecond round trips up to a quarter second.
pub const DEFAULT_LATENCY_BUCKETS_US: [u64; 12] = [
    50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000,
];

/// Snapshot of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Bucket boundaries in microseconds.
    pub bounds_us: Vec<u64>,
    /// Bucket counts, including the overflow bucket at the end.
    pub buckets: Vec<u64>,
    /// Total number of samples.
    pub samples: u64,
    /// Sum of latencies in microseconds.
    pub sum_us: u64,
}

impl LatencySnapshot {
    /// Mean latency in microseconds, or zero when no samples exist.
    pub fn mean_us(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum_us as f64 / self.samples as f64
    }
}

/// Fixed-bucket latency histogram.
///
/// Uses a linear scan to pick buckets; this is O(buckets) but the list is small
/// and stays hot in cache.
pub struct LatencyHistogram {
    bounds_us: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Creates a histogram with explicit bucket boundaries (microseconds).
    ///
    /// **Input**: `bounds_us` sorted ascending.
    /// **Output**: histogram with `bounds_us.len() + 1` buckets (last is overflow).
    pub fn new(bounds_us: Vec<u64>) -> Self {
        let buckets = (0..=bounds_us.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Records a latency measurement into the histogram.
    ///
    /// Caller passes `Duration` to avoid unit ambiguity.
    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);

        let idx = self
            .bounds_us
            .iter()
            .position(|bound| micros <= *bound)
            .unwrap_or(self.bounds_us.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the histogram.
    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_us: self.bounds_us.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}

/// Sink that keeps one histogram per operation kind.
///
/// The operation kind is read from the `type:` tag. Samples without one land
/// under `"unknown"`.
pub struct HistogramSink {
    bounds_us: Vec<u64>,
    histograms: RwLock<HashMap<String, Arc<LatencyHistogram>>>,
}

impl HistogramSink {
    /// Creates a sink with the default latency buckets.
    pub fn new() -> Self {
        Self::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_US.to_vec())
    }

    /// Creates a sink with custom latency bucket boundaries.
    ///
    /// The boundaries must be sorted ascending and represent microseconds.
    pub fn with_latency_buckets(bounds_us: Vec<u64>) -> Self {
        HistogramSink {
            bounds_us,
            histograms: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a snapshot for one operation kind, if any sample was recorded.
    pub fn snapshot(&self, op: &str) -> Option<LatencySnapshot> {
        let histograms = self.histograms.read().ok()?;
        histograms.get(op).map(|histogram| histogram.snapshot())
    }

    /// Returns snapshots for every operation kind seen so far.
    pub fn snapshot_all(&self) -> HashMap<String, LatencySnapshot> {
        match self.histograms.read() {
            Ok(histograms) => histograms
                .iter()
                .map(|(op, histogram)| (op.clone(), histogram.snapshot()))
                .collect(),
            Err(_) => HashMap::new(),
        }
    }

    fn histogram_for(&self, op: &str) -> Option<Arc<LatencyHistogram>> {
        if let Some(histogram) = self.histograms.read().ok()?.get(op) {
            return Some(histogram.clone());
        }
        let mut histograms = self.histograms.write().ok()?;
        let histogram = histograms
            .entry(op.to_string())
            .or_insert_with(|| Arc::new(LatencyHistogram::new(self.bounds_us.clone())));
        Some(histogram.clone())
    }
}

impl Default for HistogramSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencySink for HistogramSink {
    fn record_latency(&self, millis: f64, tags: &[String]) {
        let op = tags
            .iter()
            .find_map(|tag| tag.strip_prefix("type:"))
            .unwrap_or("unknown");
        // A poisoned map drops the sample; recording never fails the caller.
        if let Some(histogram) = self.histogram_for(op) {
            let millis = if millis.is_finite() { millis.max(0.0) } else { 0.0 };
            let latency = Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX);
            histogram.record(latency);
        }
    }
}
