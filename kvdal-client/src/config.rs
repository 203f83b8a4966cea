//! Client configuration.
//!
//! Values arrive from callers or TOML files as signed integers so that
//! zero and negative inputs can be recognized and replaced with defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::pool::PoolConfig;

/// Address used when none is configured.
pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";
/// Idle expiry applied when the configured value is not positive.
pub const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 10;
/// Connection cap applied when the configured value is not positive.
pub const DEFAULT_MAX_ACTIVE: i64 = 600;
/// Idle cap applied when the configured value is not positive.
pub const DEFAULT_MAX_IDLE: i64 = 3;

/// Configuration for the client and its pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend address, e.g. "127.0.0.1:6379". Also the `ipredis:` tag value.
    pub addr: String,
    /// Seconds an idle connection may wait before it is closed.
    pub idle_timeout_secs: i64,
    /// Maximum total connections (idle + in-use).
    pub max_active: i64,
    /// Maximum idle connections retained.
    pub max_idle: i64,
    /// Block callers at capacity instead of failing them.
    pub wait: bool,
    /// TCP connect timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Socket read timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    /// Socket write timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: DEFAULT_ADDR.to_string(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            wait: true,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Config for `addr` with every other field defaulted.
    pub fn new(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        }
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> ClientResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|err| ClientError::Config(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&contents)
    }

    /// Resolves the pool settings, replacing non-positive limits with defaults.
    ///
    /// There is no unbounded setting: `max_active <= 0` means the default.
    pub fn normalized(&self) -> PoolConfig {
        let idle_timeout_secs = positive_or(self.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        PoolConfig {
            addr: self.addr.clone(),
            idle_timeout: Duration::from_secs(idle_timeout_secs as u64),
            max_active: positive_or(self.max_active, DEFAULT_MAX_ACTIVE) as usize,
            max_idle: positive_or(self.max_idle, DEFAULT_MAX_IDLE) as usize,
            wait: self.wait,
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            write_timeout: self.write_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn positive_or(value: i64, default: i64) -> i64 {
    if value > 0 {
        value
    } else {
        default
    }
}
