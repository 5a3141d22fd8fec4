//! The writer engine's per-host asynchronous connection.
//!
//! Wraps `redis::aio::MultiplexedConnection` rather than a bare socket.
//! The original's hiredis-based async commands still read and discard
//! every reply off the wire even when fired with a `NULL` callback — a
//! connection that never drains replies eventually backs up the host's
//! receive buffer under sustained writes. `req_packed_command` gives us
//! that read-and-discard for free: the write queue is still
//! fire-and-forget from its own point of view (nobody awaits a query
//! result), but the wire-level round trip always completes.

use std::path::PathBuf;

use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{Cmd, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult};

/// A live fire-and-forget outbound connection to one host.
pub(crate) struct AsyncHostConn {
    conn: MultiplexedConnection,
}

impl AsyncHostConn {
    pub(crate) async fn connect(target: &str, port: u16) -> RedisResult<AsyncHostConn> {
        let addr = if port == 0 {
            ConnectionAddr::Unix(PathBuf::from(target))
        } else {
            ConnectionAddr::Tcp(target.to_string(), port)
        };
        let conn_info = ConnectionInfo {
            addr,
            redis: RedisConnectionInfo::default(),
        };
        let client = redis::Client::open(conn_info)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(AsyncHostConn { conn })
    }

    /// Submits one already-built command and awaits its reply, discarding
    /// it — the reply is still parsed off the wire, just never surfaced
    /// to the write-queue caller.
    pub(crate) async fn command(&mut self, cmd: &Cmd) -> RedisResult<()> {
        let _: redis::Value = self.conn.req_packed_command(cmd).await?;
        Ok(())
    }

    pub(crate) async fn disconnect(self) {
        drop(self);
    }
}
