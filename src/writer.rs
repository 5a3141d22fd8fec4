//! The async writer engine: one task that drives every host's outbound
//! connection, fans out queued writes, and runs the reconnect/cooldown
//! sweep on a one-second tick.
//!
//! This is the async half of the hybrid design (see crate docs): a single
//! `tokio::select!` loop alternating between the reconnect timer and the
//! write queue's wakeup, analogous to the original's libev timer + async
//! watcher pair, minus the callback indirection — a connect attempt here
//! is simply awaited in place rather than dispatched to a later callback.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::conn::AsyncHostConn;
use crate::error::MeshError;
use crate::flags::{Flags, StartGate};
use crate::host::{HostStatus, HostTable};
use crate::queue::WriteQueue;

use crate::config::HOST_FAILED_RETRY_AFTER;

pub(crate) struct WriterEngine {
    hosts: Arc<HostTable>,
    queue: Arc<WriteQueue>,
    flags: Arc<Flags>,
    conns: Vec<Option<AsyncHostConn>>,
}

impl WriterEngine {
    pub(crate) fn new(hosts: Arc<HostTable>, queue: Arc<WriteQueue>, flags: Arc<Flags>) -> Self {
        let n = hosts.len();
        WriterEngine {
            hosts,
            queue,
            flags,
            conns: (0..n).map(|_| None).collect(),
        }
    }

    /// Runs until the shutdown flag is observed and every host has been
    /// disconnected. Posts `start_gate` as soon as the loop is entered, so
    /// `run_thr` can unblock its caller without waiting for the first tick.
    pub(crate) async fn run(mut self, start_gate: Arc<StartGate>) {
        self.flags.set_in_run();
        start_gate.signal();

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.on_timer_tick().await {
                        break;
                    }
                }
                _ = self.queue.wait_wakeup() => {
                    self.on_drain().await;
                }
            }
        }

        self.flags.unset_in_run();
    }

    /// Returns `true` once shutdown has been fully processed and the loop
    /// should stop.
    async fn on_timer_tick(&mut self) -> bool {
        if self.flags.shutdown() {
            if self.hosts.hosts_connected() > 0 {
                self.disconnect_all().await;
                return false;
            }
            return true;
        }

        let mut attempts = Vec::new();
        for idx in 0..self.hosts.len() {
            match self.hosts.state(idx).status() {
                HostStatus::Connected => {}
                HostStatus::Disconnected => attempts.push(idx),
                HostStatus::Failed => {
                    if self.hosts.state(idx).failures() >= HOST_FAILED_RETRY_AFTER {
                        attempts.push(idx);
                    } else {
                        self.hosts.on_connect_fail(idx);
                    }
                }
            }
        }

        let results = join_all(attempts.iter().map(|&idx| {
            let info = self.hosts.info(idx).clone();
            async move {
                let res = AsyncHostConn::connect(&info.target, info.port).await;
                (idx, res)
            }
        }))
        .await;

        for (idx, res) in results {
            match res {
                Ok(conn) => {
                    self.conns[idx] = Some(conn);
                    self.hosts.on_connect_ok(idx);
                }
                Err(err) => {
                    self.conns[idx] = None;
                    let info = self.hosts.info(idx);
                    let fail = MeshError::HostConnectFail {
                        target: info.target.clone(),
                        port: info.port,
                        source: err,
                    };
                    warn!(%fail, "host connect failed");
                    self.hosts.on_connect_fail(idx);
                }
            }
        }

        if !self.flags.ready() && self.hosts.all_settled() {
            debug!("all hosts settled, instance ready");
            self.flags.set_ready();
            self.queue.force_wake();
        }

        false
    }

    /// Disconnects every currently-connected host concurrently; the first
    /// half of the two-phase shutdown (drop live sockets before the next
    /// tick stops the loop for good).
    async fn disconnect_all(&mut self) {
        let idxs: Vec<usize> = (0..self.hosts.len())
            .filter(|&i| self.hosts.state(i).status() == HostStatus::Connected)
            .collect();

        let mut taken = Vec::new();
        for &idx in &idxs {
            if let Some(conn) = self.conns[idx].take() {
                taken.push((idx, conn));
            }
        }

        join_all(taken.into_iter().map(|(idx, conn)| {
            let hosts = &self.hosts;
            async move {
                conn.disconnect().await;
                hosts.on_disconnect(idx);
            }
        }))
        .await;
    }

    /// Drains the write queue, fanning each entry out to every connected
    /// host. An entry that reaches zero successful hosts is re-queued at
    /// the head and drain stops there for this wakeup.
    async fn on_drain(&mut self) {
        self.queue.clear_pending();

        loop {
            let entry = match self.queue.shift() {
                Some(e) => e,
                None => break,
            };

            let mut delivered = 0u32;
            for idx in 0..self.hosts.len() {
                if self.hosts.state(idx).status() != HostStatus::Connected {
                    continue;
                }
                let Some(conn) = self.conns[idx].as_mut() else {
                    continue;
                };
                match conn.command(&entry).await {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        let info = self.hosts.info(idx);
                        warn!(target = %info.target, port = info.port, %err, "write failed, disconnecting host");
                        self.conns[idx] = None;
                        self.hosts.on_disconnect(idx);
                    }
                }
            }

            if delivered == 0 {
                self.queue.unshift(entry);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostTable;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn stub_host() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    /// P1: every write reaches every currently-connected host exactly once.
    #[tokio::test]
    async fn fanout_write_reaches_every_connected_host() {
        let (l1, p1) = stub_host().await;
        let (l2, p2) = stub_host().await;

        let mut table = HostTable::new();
        table.push("127.0.0.1".into(), p1);
        table.push("127.0.0.1".into(), p2);
        let hosts = Arc::new(table);
        let queue = Arc::new(WriteQueue::new());
        let flags = Arc::new(Flags::new());

        let accept = |listener: TcpListener| async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"+OK\r\n").await.unwrap();
            buf.truncate(n);
            buf
        };
        let h1 = tokio::spawn(accept(l1));
        let h2 = tokio::spawn(accept(l2));

        let mut engine = WriterEngine::new(hosts.clone(), queue.clone(), flags.clone());
        assert!(!engine.on_timer_tick().await);
        for _ in 0..100 {
            if hosts.hosts_connected() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hosts.hosts_connected(), 2);

        queue.append(redis::cmd("SET").arg("k").arg("v").clone());
        engine.on_drain().await;

        let got1 = h1.await.unwrap();
        let got2 = h2.await.unwrap();
        let expected = redis::cmd("SET").arg("k").arg("v").get_packed_command();
        assert_eq!(got1, expected);
        assert_eq!(got2, expected);
    }
}
