//! Crate-level error taxonomy.
//!
//! Transport errors raised while talking to a single host are retried
//! locally (see [`crate::reader::Reader::exec`]) and only escalate to one
//! of these variants once the retry budget described in the module docs
//! is exhausted. A Redis protocol-level error reply (e.g. `-ERR ...`) is
//! never represented here: it is a valid [`redis::Value::Error`] returned
//! from `Reader::exec`, not a `MeshError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("failed to connect to host {target}:{port}: {source}")]
    HostConnectFail {
        target: String,
        port: u16,
        #[source]
        source: redis::RedisError,
    },

    #[error("all hosts are unavailable for reads")]
    AllHostsUnavailable,

    #[error("exhausted {retries} retries without a successful reply")]
    RetryExhausted { retries: u32 },

    #[error("command dropped: write queue full while every host is down")]
    QueueDropped,

    #[error("I/O timed out talking to host {target}:{port}")]
    IoTimeout { target: String, port: u16 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

impl MeshError {
    /// Classifies a transport-level `redis::RedisError` the way the reader
    /// retry path needs to: timeouts and dropped connections are treated
    /// as recoverable host failures, everything else propagates as-is.
    pub(crate) fn is_recoverable(err: &redis::RedisError) -> bool {
        err.is_timeout() || err.is_connection_dropped() || err.is_io_error()
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
