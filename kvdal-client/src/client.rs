//! # Synchronous Client API
//!
//! Purpose: Expose the typed command catalog (strings, hashes, sorted sets,
//! sets, lists, expiry) over a pooled RESP2 connection, reporting one
//! latency sample per call.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and protocol details.
//! 2. **One Connection per Call**: Acquire, issue one command, release, then report.
//! 3. **Fail Closed**: A failed release replaces whatever the command returned.
//! 4. **Absent Is Not an Error**: Read commands map "no value" to a zero value.
//!
//! Every operation takes caller tags as `(key, value)` pairs. They are appended
//! after `type:<op>` and `ipredis:<addr>` in the latency sample.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use kvdal_metrics::{LatencySink, NoopSink};
use tracing::debug;

use crate::command::{self, OpKind, Request, ScoreBound};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::normalize;
use crate::pool::{ConnectionPool, PoolStats};
use crate::resp::Reply;

/// Caller-supplied latency tag, rendered as `key:value`.
pub type Tag<'a> = (&'a str, &'a str);

/// Synchronous client with connection pooling and latency reporting.
///
/// Safe to share across threads; concurrency is bounded by the pool.
pub struct KVClient {
    pool: ConnectionPool,
    config: ClientConfig,
    sink: RwLock<Arc<dyn LatencySink>>,
    skipped_scores: AtomicU64,
}

impl KVClient {
    /// Creates a client with default configuration and no latency sink.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(addr))
    }

    /// Creates a client with a custom configuration and no latency sink.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    /// Creates a client reporting latencies to `sink`.
    ///
    /// Connections are dialed lazily; this only validates the address shape.
    pub fn with_sink(config: ClientConfig, sink: Arc<dyn LatencySink>) -> ClientResult<Self> {
        if config.addr.trim().is_empty() {
            return Err(ClientError::InvalidAddress(config.addr));
        }
        let pool = ConnectionPool::new(config.normalized());
        Ok(KVClient {
            pool,
            config,
            sink: RwLock::new(sink),
            skipped_scores: AtomicU64::new(0),
        })
    }

    /// Replaces the latency sink. In-flight operations may still report to the old one.
    pub fn set_sink(&self, sink: Arc<dyn LatencySink>) {
        let mut current = self.sink.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = sink;
    }

    /// Returns the current latency sink.
    pub fn sink(&self) -> Arc<dyn LatencySink> {
        self.sink
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Configuration the client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current idle and total connection counts.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Number of score tokens dropped by `*_with_scores` decoding so far.
    pub fn skipped_scores(&self) -> u64 {
        self.skipped_scores.load(Ordering::Relaxed)
    }

    /// Closes the pool. Later calls fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }

    // ---- scalar ----

    /// Fetches a value by key. Returns an empty string when the key is missing.
    pub fn get(&self, key: &str, tags: &[Tag<'_>]) -> ClientResult<String> {
        self.instrumented(OpKind::Get, tags, || {
            normalize::string_or_empty(self.execute(&command::get(key))?)
        })
    }

    /// Writes a value; `ttl_secs > 0` writes it with an expiry.
    pub fn set(&self, key: &str, value: &str, ttl_secs: i64, tags: &[Tag<'_>]) -> ClientResult<()> {
        let request = if ttl_secs > 0 {
            command::setex(key, ttl_secs, value)
        } else {
            command::set(key, value)
        };
        self.instrumented(OpKind::Set, tags, || normalize::discard(self.execute(&request)?))
    }

    /// Deletes a key. Deleting a missing key is not an error.
    pub fn delete(&self, key: &str, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::Delete, tags, || {
            normalize::discard(self.execute(&command::del(key))?)
        })
    }

    /// Renames a key; fails with a server error if `key` is missing.
    pub fn rename(&self, key: &str, new_key: &str, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::Rename, tags, || {
            normalize::discard(self.execute(&command::rename(key, new_key))?)
        })
    }

    /// Sets a time-to-live in seconds. Returns true when the timeout was set.
    pub fn expire(&self, key: &str, seconds: i64, tags: &[Tag<'_>]) -> ClientResult<bool> {
        self.instrumented(OpKind::Expire, tags, || {
            normalize::boolean(self.execute(&command::expire(key, seconds))?)
        })
    }

    /// True iff the backend reports a positive existence count.
    pub fn exists(&self, key: &str, tags: &[Tag<'_>]) -> ClientResult<bool> {
        self.instrumented(OpKind::Exists, tags, || {
            normalize::boolean(self.execute(&command::exists(key))?)
        })
    }

    // ---- hash ----

    /// Fetches one hash field. Returns an empty string when it is missing.
    pub fn hget(&self, key: &str, field: &str, tags: &[Tag<'_>]) -> ClientResult<String> {
        self.instrumented(OpKind::HGet, tags, || {
            normalize::string_or_empty(self.execute(&command::hget(key, field))?)
        })
    }

    /// Fetches every field of a hash; a missing key yields an empty map.
    pub fn hgetall(&self, key: &str, tags: &[Tag<'_>]) -> ClientResult<HashMap<String, String>> {
        self.instrumented(OpKind::HGetAll, tags, || {
            normalize::string_map(self.execute(&command::hgetall(key))?)
        })
    }

    /// Number of fields in a hash.
    pub fn hlen(&self, key: &str, tags: &[Tag<'_>]) -> ClientResult<u64> {
        self.instrumented(OpKind::HLen, tags, || {
            normalize::count(self.execute(&command::hlen(key))?)
        })
    }

    /// Sets one hash field.
    pub fn hset(&self, key: &str, field: &str, value: &str, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::HSet, tags, || {
            normalize::discard(self.execute(&command::hset(key, field, value))?)
        })
    }

    /// Fetches several hash fields.
    ///
    /// Only fields the backend returned a value for appear in the result.
    pub fn hmget<S: AsRef<str>>(
        &self,
        key: &str,
        fields: &[S],
        tags: &[Tag<'_>],
    ) -> ClientResult<HashMap<String, String>> {
        self.instrumented(OpKind::HMGet, tags, || {
            if fields.is_empty() {
                return Ok(HashMap::new());
            }
            normalize::fields_map(fields, self.execute(&command::hmget(key, fields))?)
        })
    }

    /// Writes several hash fields. An empty `pairs` issues nothing.
    pub fn hmset<K: AsRef<str>, V: AsRef<str>>(
        &self,
        key: &str,
        pairs: &[(K, V)],
        tags: &[Tag<'_>],
    ) -> ClientResult<()> {
        self.instrumented(OpKind::HMSet, tags, || {
            if pairs.is_empty() {
                return Ok(());
            }
            normalize::discard(self.execute(&command::hmset(key, pairs))?)
        })
    }

    /// Removes hash fields. Missing fields are not an error.
    pub fn hdel<S: AsRef<str>>(&self, key: &str, fields: &[S], tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::HDel, tags, || {
            if fields.is_empty() {
                return Ok(());
            }
            normalize::discard(self.execute(&command::hdel(key, fields))?)
        })
    }

    // ---- sorted set ----

    /// Adds members with scores. Returns how many members were new.
    pub fn zadd<S: AsRef<str>>(&self, key: &str, pairs: &[(S, f64)], tags: &[Tag<'_>]) -> ClientResult<u64> {
        self.instrumented(OpKind::ZAdd, tags, || {
            if pairs.is_empty() {
                return Ok(0);
            }
            let request = command::zadd(key, pairs)?;
            normalize::count(self.execute(&request)?)
        })
    }

    /// Score of `member`, or `0.0` when the member or key is missing.
    pub fn zscore(&self, key: &str, member: &str, tags: &[Tag<'_>]) -> ClientResult<f64> {
        self.instrumented(OpKind::ZScore, tags, || {
            let reply = self.execute(&command::zscore(key, member))?;
            normalize::absent_as(normalize::float(reply), 0.0)
        })
    }

    /// Adds `delta` to the member's score. Returns the new score.
    pub fn zincrby(&self, key: &str, delta: f64, member: &str, tags: &[Tag<'_>]) -> ClientResult<f64> {
        self.instrumented(OpKind::ZIncrBy, tags, || {
            let request = command::zincrby(key, delta, member)?;
            normalize::float(self.execute(&request)?)
        })
    }

    /// Removes members. Missing members are not an error.
    pub fn zrem<S: AsRef<str>>(&self, key: &str, members: &[S], tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::ZRem, tags, || {
            if members.is_empty() {
                return Ok(());
            }
            normalize::discard(self.execute(&command::zrem(key, members))?)
        })
    }

    /// Counts members with scores in `[min, max]`, bounds as range tokens.
    pub fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound, tags: &[Tag<'_>]) -> ClientResult<u64> {
        self.instrumented(OpKind::ZCount, tags, || {
            let request = command::zcount(key, min, max)?;
            normalize::count(self.execute(&request)?)
        })
    }

    /// Members by rank, ascending score.
    pub fn zrange(&self, key: &str, start: i64, stop: i64, tags: &[Tag<'_>]) -> ClientResult<Vec<String>> {
        self.instrumented(OpKind::ZRange, tags, || {
            normalize::strings(self.execute(&command::zrange(key, start, stop, false))?)
        })
    }

    /// Members by rank, descending score.
    pub fn zrevrange(&self, key: &str, start: i64, stop: i64, tags: &[Tag<'_>]) -> ClientResult<Vec<String>> {
        self.instrumented(OpKind::ZRevRange, tags, || {
            normalize::strings(self.execute(&command::zrevrange(key, start, stop, false))?)
        })
    }

    /// Members with scores in `[min, max]`, ascending.
    pub fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        tags: &[Tag<'_>],
    ) -> ClientResult<Vec<String>> {
        self.instrumented(OpKind::ZRangeByScore, tags, || {
            let request = command::zrangebyscore(key, min, max)?;
            normalize::strings(self.execute(&request)?)
        })
    }

    /// Members with scores in the range, descending. Takes `max` before `min`.
    pub fn zrev_range_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        tags: &[Tag<'_>],
    ) -> ClientResult<Vec<String>> {
        self.instrumented(OpKind::ZRevRangeByScore, tags, || {
            let request = command::zrevrangebyscore(key, max, min)?;
            normalize::strings(self.execute(&request)?)
        })
    }

    /// Members by rank with their scores. Unparsable scores are skipped.
    pub fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        tags: &[Tag<'_>],
    ) -> ClientResult<HashMap<String, f64>> {
        self.instrumented(OpKind::ZRangeWithScores, tags, || {
            let reply = self.execute(&command::zrange(key, start, stop, true))?;
            self.scored_members(key, reply)
        })
    }

    /// Members by reverse rank with their scores. Unparsable scores are skipped.
    pub fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        tags: &[Tag<'_>],
    ) -> ClientResult<HashMap<String, f64>> {
        self.instrumented(OpKind::ZRevRangeWithScores, tags, || {
            let reply = self.execute(&command::zrevrange(key, start, stop, true))?;
            self.scored_members(key, reply)
        })
    }

    // ---- set ----

    /// Adds members, then applies `ttl_secs` as a separate command when positive.
    ///
    /// The two steps use separate connections and are not atomic.
    pub fn sadd<S: AsRef<str>>(&self, key: &str, members: &[S], ttl_secs: i64, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::SAdd, tags, || {
            self.write_then_expire(key, members, ttl_secs, command::sadd)
        })
    }

    /// All members of a set.
    pub fn smembers(&self, key: &str, tags: &[Tag<'_>]) -> ClientResult<HashSet<String>> {
        self.instrumented(OpKind::SMembers, tags, || {
            normalize::string_set(self.execute(&command::smembers(key))?)
        })
    }

    // ---- list ----

    /// Appends members, then applies `ttl_secs` when positive. Not atomic.
    pub fn rpush<S: AsRef<str>>(&self, key: &str, members: &[S], ttl_secs: i64, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::RPush, tags, || {
            self.write_then_expire(key, members, ttl_secs, command::rpush)
        })
    }

    /// Prepends members, then applies `ttl_secs` when positive. Not atomic.
    pub fn lpush<S: AsRef<str>>(&self, key: &str, members: &[S], ttl_secs: i64, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::LPush, tags, || {
            self.write_then_expire(key, members, ttl_secs, command::lpush)
        })
    }

    /// Removes up to `count` occurrences of `value` (sign picks the direction).
    pub fn lrem(&self, key: &str, count: i64, value: &str, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::LRem, tags, || {
            normalize::discard(self.execute(&command::lrem(key, count, value))?)
        })
    }

    /// Trims a list to the inclusive range `[start, stop]`.
    pub fn ltrim(&self, key: &str, start: i64, stop: i64, tags: &[Tag<'_>]) -> ClientResult<()> {
        self.instrumented(OpKind::LTrim, tags, || {
            normalize::discard(self.execute(&command::ltrim(key, start, stop))?)
        })
    }

    /// Elements between `start` and `stop`, both inclusive.
    pub fn lrange(&self, key: &str, start: i64, stop: i64, tags: &[Tag<'_>]) -> ClientResult<Vec<String>> {
        self.instrumented(OpKind::LRange, tags, || {
            normalize::strings(self.execute(&command::lrange(key, start, stop))?)
        })
    }

    // ---- plumbing ----

    /// Acquires a connection, issues one request and releases the connection.
    ///
    /// The release happens on every path; its failure wins over the reply.
    fn execute(&self, request: &Request) -> ClientResult<Reply> {
        let mut conn = self.pool.acquire()?;
        let reply = conn.exec(request);
        self.pool.release(conn)?;
        reply
    }

    fn write_then_expire<S: AsRef<str>>(
        &self,
        key: &str,
        members: &[S],
        ttl_secs: i64,
        build: fn(&str, &[S]) -> Request,
    ) -> ClientResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        normalize::discard(self.execute(&build(key, members))?)?;
        if ttl_secs > 0 {
            normalize::discard(self.execute(&command::expire(key, ttl_secs))?)?;
        }
        Ok(())
    }

    fn scored_members(&self, key: &str, reply: Reply) -> ClientResult<HashMap<String, f64>> {
        let decoded = normalize::scored_members(key, reply)?;
        if decoded.skipped > 0 {
            self.skipped_scores
                .fetch_add(decoded.skipped as u64, Ordering::Relaxed);
        }
        Ok(decoded.scores)
    }

    fn instrumented<T>(
        &self,
        op: OpKind,
        tags: &[Tag<'_>],
        body: impl FnOnce() -> ClientResult<T>,
    ) -> ClientResult<T> {
        let started = Instant::now();
        let result = body();
        if let Err(err) = &result {
            debug!(op = %op, addr = %self.config.addr, error = %err, "operation failed");
        }
        self.record(op, started.elapsed(), tags);
        result
    }

    fn record(&self, op: OpKind, elapsed: Duration, extra: &[Tag<'_>]) {
        let mut tags = Vec::with_capacity(extra.len() + 2);
        tags.push(format!("type:{}", op));
        tags.push(format!("ipredis:{}", self.config.addr));
        tags.extend(extra.iter().map(|(key, value)| format!("{}:{}", key, value)));
        self.sink().record_latency(elapsed.as_secs_f64() * 1000.0, &tags);
    }
}
