//! # Connection Pool
//!
//! Purpose: Reuse TCP connections to one backend endpoint, bounding how many
//! exist at once and discarding those left idle too long.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections;
//!    dialing happens outside it.
//! 3. **Wait or Fail**: At capacity, callers block on a condvar or fail fast,
//!    per `PoolConfig::wait`.
//! 4. **Cache-Friendly Buffers**: Each connection reuses its own buffers.

use std::collections::VecDeque;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::command::Request;
use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_request, read_reply, Reply};

/// Pool configuration after defaults have been applied.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Duration,
    /// Maximum total connections (idle + in-use).
    pub max_active: usize,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Block in `acquire` at capacity instead of failing.
    pub wait: bool,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections parked in the idle set.
    pub idle: usize,
    /// Connections alive, idle or checked out (including dials in progress).
    pub total: usize,
}

struct IdleConnection {
    conn: Connection,
    since: Instant,
}

struct PoolState {
    // Most recently returned at the front.
    idle: VecDeque<IdleConnection>,
    total: usize,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Counters are updated atomically under the lock, so poison is benign.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool. No connection is dialed until first use.
    pub fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
            closed: false,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        }
    }

    /// Acquires a connection, reusing a fresh idle one or dialing a new one.
    ///
    /// At capacity this blocks until another connection is released when
    /// `wait` is set, otherwise it returns `PoolExhausted`. Dial failures are
    /// returned as-is; there is no internal retry.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let config = &self.inner.config;
        let mut state = self.inner.lock();
        loop {
            if state.closed {
                return Err(ClientError::PoolClosed);
            }

            prune_expired(&mut state, config.idle_timeout);
            if let Some(idle) = state.idle.pop_front() {
                return Ok(PooledConnection::new(self.inner.clone(), idle.conn));
            }

            if state.total < config.max_active {
                state.total += 1;
                break;
            }

            if !config.wait {
                return Err(ClientError::PoolExhausted);
            }
            trace!(addr = %config.addr, total = state.total, "pool saturated, waiting");
            state = self
                .inner
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        drop(state);

        match Connection::connect(config) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                self.inner.release_slot();
                Err(err)
            }
        }
    }

    /// Returns a connection to the pool.
    ///
    /// Healthy connections go back to the idle set unless it is full. Broken
    /// ones are shut down. Fails when the pool is closed or the socket of a
    /// discarded connection could not be shut down.
    pub fn release(&self, mut pooled: PooledConnection) -> ClientResult<()> {
        let conn = match pooled.conn.take() {
            Some(conn) => conn,
            None => return Ok(()),
        };
        return_connection(&self.inner, conn, pooled.valid)
    }

    /// Closes the pool: idle connections are dropped and waiters are woken.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let drained = state.idle.len();
        state.total = state.total.saturating_sub(drained);
        let idle: Vec<_> = state.idle.drain(..).collect();
        drop(state);
        self.inner.available.notify_all();

        for entry in idle {
            let _ = entry.conn.shutdown();
        }
        debug!(addr = %self.inner.config.addr, drained, "connection pool closed");
    }

    /// Snapshot of idle and total connection counts.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            idle: state.idle.len(),
            total: state.total,
        }
    }
}

fn prune_expired(state: &mut PoolState, idle_timeout: Duration) {
    // Oldest entries sit at the back.
    while let Some(entry) = state.idle.back() {
        if entry.since.elapsed() < idle_timeout {
            break;
        }
        if let Some(expired) = state.idle.pop_back() {
            state.total = state.total.saturating_sub(1);
            let _ = expired.conn.shutdown();
        }
    }
}

fn return_connection(inner: &PoolInner, conn: Connection, valid: bool) -> ClientResult<()> {
    let mut state = inner.lock();
    if valid && !state.closed && state.idle.len() < inner.config.max_idle {
        state.idle.push_front(IdleConnection {
            conn,
            since: Instant::now(),
        });
        drop(state);
        inner.available.notify_one();
        return Ok(());
    }

    let closed = state.closed;
    state.total = state.total.saturating_sub(1);
    drop(state);
    inner.available.notify_one();

    let shutdown = conn.shutdown();
    if closed {
        warn!(addr = %inner.config.addr, "connection released into a closed pool");
        return Err(ClientError::Release("pool closed".to_string()));
    }
    shutdown.map_err(|err| {
        warn!(addr = %inner.config.addr, error = %err, "failed to close discarded connection");
        ClientError::Release(err.to_string())
    })
}

/// Connection checked out of the pool.
///
/// Hand it back with [`ConnectionPool::release`]. If it is dropped instead,
/// the slot is still returned but release errors are lost.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Issues one request and reads its reply.
    pub fn exec(&mut self, request: &Request) -> ClientResult<Reply> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(ClientError::Protocol),
        };
        let reply = conn.exec(request);
        if let Err(err) = &reply {
            // Error replies leave the stream framed; anything else does not.
            if !matches!(err, ClientError::Server(_)) {
                self.valid = false;
            }
        }
        reply
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = return_connection(&self.pool, conn, self.valid);
        }
    }
}

/// Single TCP connection with reusable buffers.
pub struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        debug!(addr = %config.addr, "dialed backend connection");

        Ok(Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        })
    }

    fn exec(&mut self, request: &Request) -> ClientResult<Reply> {
        self.write_buf.clear();
        encode_request(request, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_reply(&mut self.reader, &mut self.line_buf)
    }

    fn shutdown(&self) -> io::Result<()> {
        match self.reader.get_ref().shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addrs: Vec<SocketAddr> = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?
        .collect();
    if addrs.is_empty() {
        return Err(ClientError::InvalidAddress(config.addr.clone()));
    }

    let mut last_err = None;
    for addr in &addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(ClientError::Connect {
        addr: config.addr.clone(),
        source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
    })
}
