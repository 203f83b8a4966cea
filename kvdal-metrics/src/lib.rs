//! # kvdal Metrics
//!
//! Purpose: Receive per-operation latency samples from the client and
//! forward or aggregate them without ever failing the caller.
//!
//! ## Design Principles
//! 1. **Sink Interface**: `LatencySink` is the only outward metrics call.
//! 2. **Fire-and-Forget**: Recording returns nothing and never blocks on a backend.
//! 3. **Cheap Aggregation**: Histograms use relaxed atomics on the hot path.

mod histogram;
mod sink;

pub use histogram::{HistogramSink, LatencyHistogram, LatencySnapshot, DEFAULT_LATENCY_BUCKETS_US};
pub use sink::{LatencySink, NoopSink, TracingSink};
