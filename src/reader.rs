//! A synchronous single-host connection with retry and failover logic,
//! executing one batch of pre-serialized commands per [`Reader::exec`]
//! call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, ConnectionLike, RedisConnectionInfo, Value};
use tracing::{debug, warn};

use crate::error::{MeshError, Result};
use crate::host::HostTable;

/// A reader owns one synchronous connection to one host. It lives either
/// idle in the [`crate::pool::ReaderPool`] (`free == true`) or checked out
/// by exactly one caller.
pub struct Reader {
    hosts: Arc<HostTable>,
    timeout: Duration,
    max_retries: u32,
    conn: Option<redis::Connection>,
    host_idx: Option<usize>,
    pub(crate) free: bool,
}

impl Reader {
    pub(crate) fn new(hosts: Arc<HostTable>, timeout: Duration, max_retries: u32) -> Self {
        Reader {
            hosts,
            timeout,
            max_retries,
            conn: None,
            host_idx: None,
            free: false,
        }
    }

    /// Runs `cmds` (each already packed via [`redis::Cmd::get_packed_command`])
    /// against the reader's current host as one pipeline: every command is
    /// written before any reply is read. On a transport error the reader
    /// tears down its connection, re-selects a host per the
    /// primary-preferring policy (see module docs), and replays the whole
    /// batch — up to `max_retries` host failovers. `redis`'s pipeline API
    /// gives no visibility into how many replies of a failed batch were
    /// actually parsed, so a retry always restarts from the first command
    /// rather than some finer-grained offset.
    pub fn exec(&mut self, cmds: &[Vec<u8>]) -> Result<Vec<Value>> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }

        if self.conn.is_none() {
            self.select_and_connect()?;
        }

        let mut retries_used = 0u32;

        loop {
            match self.try_exec(cmds) {
                Ok(replies) => return Ok(replies),
                Err(err) => {
                    self.conn = None;

                    if !MeshError::is_recoverable(&err) {
                        return Err(MeshError::from(err));
                    }

                    let target = self
                        .host_idx
                        .map(|i| self.hosts.info(i).target.clone())
                        .unwrap_or_default();
                    warn!(target = %target, %err, "reader transport error, retrying");

                    retries_used += 1;
                    if retries_used > self.max_retries {
                        return Err(MeshError::RetryExhausted {
                            retries: self.max_retries,
                        });
                    }
                    self.select_and_connect()?;
                }
            }
        }
    }

    /// Writes `cmds` as a single pipeline and reads that many replies
    /// back, in order.
    fn try_exec(&mut self, cmds: &[Vec<u8>]) -> std::result::Result<Vec<Value>, redis::RedisError> {
        let mut packed = Vec::new();
        for c in cmds {
            packed.extend_from_slice(c);
        }

        let conn = self.conn.as_mut().expect("connection established by caller");
        conn.req_packed_commands(&packed, 0, cmds.len())
    }

    fn select_and_connect(&mut self) -> Result<()> {
        let n = self.hosts.len();
        if n == 0 {
            return Err(MeshError::AllHostsUnavailable);
        }

        if self.hosts.state(0).status() != crate::host::HostStatus::Failed {
            if let Some(conn) = self.try_connect(0) {
                self.conn = Some(conn);
                self.host_idx = Some(0);
                return Ok(());
            }
        }

        for idx in 1..n {
            if self.hosts.state(idx).status() == crate::host::HostStatus::Failed {
                continue;
            }
            if let Some(conn) = self.try_connect(idx) {
                self.conn = Some(conn);
                self.host_idx = Some(idx);
                return Ok(());
            }
        }

        Err(MeshError::AllHostsUnavailable)
    }

    /// Connects with `self.timeout` as both connect and I/O timeout. The
    /// original's `HOST_TCP_KEEPALIVE` knob has no equivalent here:
    /// `redis::Client`/`redis::Connection` expose no socket-level
    /// keepalive hook in the version this crate depends on, so a half-open
    /// peer is instead reclaimed by the connect/IO timeout already in
    /// force — a blocked read or write eventually times out and drives the
    /// same retry-and-failover path a keepalive-triggered disconnect
    /// would have (see DESIGN.md).
    fn try_connect(&self, idx: usize) -> Option<redis::Connection> {
        let info = self.hosts.info(idx);
        let addr = if info.is_unix() {
            ConnectionAddr::Unix(PathBuf::from(&info.target))
        } else {
            ConnectionAddr::Tcp(info.target.clone(), info.port)
        };
        let conn_info = ConnectionInfo {
            addr,
            redis: RedisConnectionInfo::default(),
        };

        match redis::Client::open(conn_info).and_then(|c| c.get_connection_with_timeout(self.timeout)) {
            Ok(conn) => {
                debug!(target = %info.target, port = info.port, "reader connected");
                Some(conn)
            }
            Err(e) if e.is_timeout() => {
                let timeout = MeshError::IoTimeout {
                    target: info.target.clone(),
                    port: info.port,
                };
                warn!(%timeout, "reader connect failed");
                None
            }
            Err(e) => {
                warn!(target = %info.target, port = info.port, err = %e, "reader connect failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hosts_with(statuses: &[(&str, u16)]) -> Arc<HostTable> {
        let mut table = HostTable::new();
        for (target, port) in statuses {
            table.push((*target).to_string(), *port);
        }
        Arc::new(table)
    }

    #[test]
    fn exec_of_empty_batch_is_a_noop() {
        let hosts = hosts_with(&[("127.0.0.1", 1)]);
        let mut reader = Reader::new(hosts, Duration::from_millis(50), 1);
        assert_eq!(reader.exec(&[]).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn all_hosts_unavailable_when_table_is_empty() {
        let hosts = Arc::new(HostTable::new());
        let mut reader = Reader::new(hosts, Duration::from_millis(50), 1);
        let err = reader.exec(&[vec![1]]).unwrap_err();
        assert!(matches!(err, MeshError::AllHostsUnavailable));
    }

    #[test]
    fn skips_failed_primary_in_selection() {
        // Port 1 is unroutable (reserved), so connect attempts fail fast;
        // this only exercises the Failed-skip branch, not a real connect.
        let hosts = hosts_with(&[("127.0.0.1", 1), ("127.0.0.1", 2)]);
        for _ in 0..=crate::config::HOST_DISCONNECTED_RETRIES {
            hosts.on_connect_fail(0);
        }
        assert_eq!(hosts.state(0).status(), crate::host::HostStatus::Failed);
        let mut reader = Reader::new(hosts.clone(), Duration::from_millis(20), 0);
        let err = reader.exec(&[vec![1]]).unwrap_err();
        assert!(matches!(err, MeshError::AllHostsUnavailable));
    }
}
