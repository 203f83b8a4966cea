//! # kvdal Client
//!
//! Purpose: Provide a synchronous, pooled data-access facade over a
//! Redis-compatible key-value store, with a fixed catalog of typed commands
//! and a latency sample for every call.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections and bound how many exist.
//! 2. **Typed Requests**: Each command is built by its own function, never from
//!    loose argument lists.
//! 3. **Tagged Replies**: Replies decode into one `Reply` enum and are normalized
//!    per command family by exhaustive matching.
//! 4. **Pluggable Metrics**: Latencies go to a swappable `LatencySink`.
//!
//! ```no_run
//! use kvdal_client::{ClientConfig, KVClient};
//!
//! # fn main() -> kvdal_client::ClientResult<()> {
//! let client = KVClient::with_config(ClientConfig::new("127.0.0.1:6379"))?;
//! client.set("greeting", "hello", 60, &[])?;
//! let value = client.get("greeting", &[("caller", "docs")])?;
//! assert_eq!(value, "hello");
//! # Ok(())
//! # }
//! ```

mod client;
mod command;
mod config;
mod error;
mod normalize;
mod pool;
mod resp;

pub use client::{KVClient, Tag};
pub use command::{OpKind, ScoreBound};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use kvdal_metrics::{HistogramSink, LatencySink, NoopSink, TracingSink};
pub use pool::{PoolConfig, PoolStats};
