//! Error taxonomy for the client.

use std::io;

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Dialing the backend failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Pool is at capacity and configured not to wait.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Pool was closed before or while acquiring.
    #[error("connection pool closed")]
    PoolClosed,

    /// Returning a connection to the pool failed.
    #[error("connection release failed: {0}")]
    Release(String),

    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,

    /// Backend returned an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// Backend returned a nil reply where a value was required.
    #[error("nil reply")]
    Nil,

    /// Reply shape did not match what the command decodes.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),

    /// Argument rejected before reaching the backend.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// True for dial/acquire failures.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::InvalidAddress(_)
                | ClientError::PoolExhausted
                | ClientError::PoolClosed
        )
    }

    /// True when releasing a connection failed.
    pub fn is_release(&self) -> bool {
        matches!(self, ClientError::Release(_))
    }

    /// True for the backend "no such value" signal.
    pub fn is_nil(&self) -> bool {
        matches!(self, ClientError::Nil)
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert!(ClientError::PoolExhausted.is_connectivity());
        assert!(ClientError::Connect {
            addr: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
        .is_connectivity());
        assert!(!ClientError::Protocol.is_connectivity());
        assert!(ClientError::Release("pool closed".into()).is_release());
        assert!(ClientError::Nil.is_nil());
        assert!(!ClientError::Server("ERR".into()).is_nil());
    }

    #[test]
    fn display_carries_context() {
        let err = ClientError::Server("WRONGTYPE Operation against a key".into());
        assert_eq!(err.to_string(), "server error: WRONGTYPE Operation against a key");
    }
}
