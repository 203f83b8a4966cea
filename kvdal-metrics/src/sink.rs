//! # Latency Sinks
//!
//! The outward observability boundary of the client: one call per
//! operation with the elapsed milliseconds and an ordered tag list.

use tracing::debug;

/// Destination for per-operation latency samples.
///
/// Implementations must not block on a slow or failing metrics backend and
/// must never panic; the client calls them on its own request path.
pub trait LatencySink: Send + Sync {
    /// Records one latency sample.
    ///
    /// `tags` are `key:value` strings in the order the client produced them.
    fn record_latency(&self, millis: f64, tags: &[String]);
}

/// Sink that discards every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LatencySink for NoopSink {
    fn record_latency(&self, _millis: f64, _tags: &[String]) {}
}

/// Sink that emits each sample as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LatencySink for TracingSink {
    fn record_latency(&self, millis: f64, tags: &[String]) {
        debug!(target: "kvdal::latency", millis, tags = %tags.join(","), "operation latency");
    }
}
