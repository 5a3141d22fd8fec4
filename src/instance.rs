//! The public entry point: [`Instance`] owns the host table, write queue
//! and reader pool, and drives the writer engine either on the calling
//! thread ([`Instance::run`]) or on a dedicated one ([`Instance::run_thr`]).

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::config::{MeshConfig, HOST_FILE_MAX_BYTES};
use crate::error::{MeshError, Result};
use crate::flags::{Flags, StartGate};
use crate::host::HostTable;
use crate::pool::ReaderPool;
use crate::queue::WriteQueue;
use crate::reader::Reader;
use crate::writer::WriterEngine;

/// An embeddable multi-host Redis client: fan-out writes to every host,
/// pooled synchronous reads with primary-preferring failover.
///
/// See the crate docs for the overall architecture. Hosts may only be
/// added before the instance has been shared with a reader or run —
/// [`Instance::host_add`] and [`Instance::host_file`] return
/// [`MeshError::Config`] once that has happened.
pub struct Instance {
    hosts: Arc<HostTable>,
    queue: Arc<WriteQueue>,
    flags: Arc<Flags>,
    config: MeshConfig,
    pool: OnceLock<ReaderPool>,
    thread: Option<JoinHandle<()>>,
}

impl Instance {
    pub fn new(config: MeshConfig) -> Result<Instance> {
        config.validate()?;
        Ok(Instance {
            hosts: Arc::new(HostTable::new()),
            queue: Arc::new(WriteQueue::new()),
            flags: Arc::new(Flags::new()),
            config,
            pool: OnceLock::new(),
            thread: None,
        })
    }

    /// Sets the sync connect/IO timeout, in milliseconds. No-op once a
    /// reader has already been allocated.
    pub fn timeout(&mut self, ms: u64) -> Result<()> {
        if self.pool.get().is_some() {
            return Err(MeshError::Config(
                "timeout must be set before the first reader is allocated".into(),
            ));
        }
        self.config = std::mem::take(&mut self.config).timeout_ms(ms);
        Ok(())
    }

    /// Bounds the number of outstanding readers. No-op once a reader has
    /// already been allocated.
    pub fn r_max(&mut self, max: usize) -> Result<()> {
        if self.pool.get().is_some() {
            return Err(MeshError::Config(
                "r_max must be set before the first reader is allocated".into(),
            ));
        }
        self.config = std::mem::take(&mut self.config).reader_max(max);
        Ok(())
    }

    /// Bounds the number of host failovers per `Reader::exec` call. No-op
    /// once a reader has already been allocated.
    pub fn r_retry(&mut self, retry: u32) -> Result<()> {
        if self.pool.get().is_some() {
            return Err(MeshError::Config(
                "r_retry must be set before the first reader is allocated".into(),
            ));
        }
        self.config = std::mem::take(&mut self.config).reader_retry(retry);
        Ok(())
    }

    /// Adds one host to the fan-out/failover set. `port == 0` means
    /// `target` is a local-socket path rather than a hostname.
    ///
    /// Fails with [`MeshError::Config`] once the host table has already
    /// been shared with a reader or the writer engine — hosts can only be
    /// added while this `Instance` is the table's sole owner.
    pub fn host_add(&mut self, target: &str, port: u16) -> Result<()> {
        Arc::get_mut(&mut self.hosts)
            .ok_or_else(|| {
                MeshError::Config("cannot add a host after startup".into())
            })?
            .push(target.to_string(), port);
        Ok(())
    }

    /// Adds every host listed in `path`, one `target[:port]` per line. A
    /// line with no `:port` is added with `port = 0` (a local-socket
    /// path), matching `host_add`'s own convention. Blank lines and lines
    /// starting with `#` are ignored. The file is capped at
    /// [`HOST_FILE_MAX_BYTES`] to bound a single read.
    pub fn host_file(&mut self, path: &Path) -> Result<usize> {
        let meta = fs::metadata(path).map_err(|e| MeshError::Config(e.to_string()))?;
        if meta.len() > HOST_FILE_MAX_BYTES {
            return Err(MeshError::Config(format!(
                "host file {} exceeds {HOST_FILE_MAX_BYTES} bytes",
                path.display()
            )));
        }

        let mut contents = String::new();
        fs::File::open(path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|e| MeshError::Config(e.to_string()))?;

        let mut added = 0;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once(':') {
                Some((target, port)) => {
                    let port: u16 = port
                        .trim()
                        .parse()
                        .map_err(|_| MeshError::Config(format!("bad port in line: {line}")))?;
                    self.host_add(target.trim(), port)?;
                }
                None => self.host_add(line, 0)?,
            }
            added += 1;
        }
        Ok(added)
    }

    /// Queues `cmd` for fan-out to every connected host. Accepted even
    /// before the instance is ready — delivery simply waits for the
    /// writer engine. Fan-out is fire-and-forget by design, so this only
    /// ever fails to enqueue, not to deliver.
    pub fn write(&self, cmd: redis::Cmd) -> Result<()> {
        self.queue.append(cmd);
        self.queue.trigger(self.flags.ready(), self.flags.shutdown());
        Ok(())
    }

    /// Checks out a reader from the bounded pool, blocking if the pool is
    /// at capacity and every reader is checked out.
    pub fn reader_get(&self) -> Reader {
        self.pool().acquire()
    }

    /// Returns a reader to the pool for reuse.
    pub fn reader_release(&self, reader: Reader) {
        self.pool().release(reader);
    }

    fn pool(&self) -> &ReaderPool {
        self.pool.get_or_init(|| {
            ReaderPool::new(
                self.hosts.clone(),
                self.config.sync_timeout,
                self.config.reader_max,
                self.config.reader_retry,
            )
        })
    }

    /// Runs the writer engine on the calling thread until
    /// [`Instance::shutdown`] is observed and every host has been
    /// disconnected. Blocks, and consumes the instance: there is no loop
    /// left to re-enter once this returns, so a caller can't resurrect a
    /// shut-down instance by calling `run` a second time — the type
    /// system forbids it outright rather than relying on a flag check.
    pub fn run(self) -> Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MeshError::Config(e.to_string()))?;

        let engine = WriterEngine::new(self.hosts.clone(), self.queue.clone(), self.flags.clone());
        let gate = Arc::new(StartGate::new());
        rt.block_on(engine.run(gate));
        Ok(())
    }

    /// Spawns the writer engine on a dedicated OS thread with its own
    /// single-threaded runtime, and blocks the caller until the loop has
    /// started.
    pub fn run_thr(&mut self) -> Result<()> {
        if self.flags.in_thr() {
            return Ok(());
        }
        self.flags.set_in_thr();

        let hosts = self.hosts.clone();
        let queue = self.queue.clone();
        let flags = self.flags.clone();
        let gate = Arc::new(StartGate::new());
        let gate_for_thread = gate.clone();

        let handle = thread::Builder::new()
            .name("redis-mesh-writer".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(err) => {
                        warn!(%err, "failed to build writer runtime");
                        gate_for_thread.signal();
                        flags.unset_in_thr();
                        return;
                    }
                };
                let engine = WriterEngine::new(hosts, queue, flags.clone());
                rt.block_on(engine.run(gate_for_thread));
                flags.unset_in_thr();
            })
            .map_err(|e| MeshError::Config(e.to_string()))?;

        self.thread = Some(handle);
        gate.wait();
        Ok(())
    }

    /// Requests the writer engine stop: on the next reconnect tick it
    /// disconnects every connected host, then exits its loop.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.flags.set_shutdown();
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.flags.set_shutdown();

        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        if let Some(pool) = self.pool.get() {
            for reader in pool.drain_all() {
                drop(reader);
            }
        }

        let dropped = self.queue.drain_all();
        if !dropped.is_empty() {
            warn!(
                dropped = dropped.len(),
                "dropping undelivered writes on shutdown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// P7: shutdown followed by drop, with nothing connected and nothing
    /// queued, completes within a couple of reconnect-timer ticks.
    #[tokio::test]
    async fn shutdown_with_no_hosts_completes_quickly() {
        let mut instance = Instance::new(MeshConfig::new()).unwrap();
        instance.run_thr().unwrap();
        instance.shutdown();

        let handle = tokio::task::spawn_blocking(move || drop(instance));
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("drop did not complete within the bound")
            .unwrap();
    }

    /// Concurrency half of P4: with `reader_max = 1`, a second concurrent
    /// `reader_get` blocks until the first reader is released.
    #[tokio::test]
    async fn reader_get_blocks_at_pool_capacity() {
        let mut instance = Instance::new(MeshConfig::new().reader_max(1)).unwrap();
        instance.host_add("127.0.0.1", 6379).unwrap();
        let instance = Arc::new(instance);

        let r1 = instance.reader_get();

        let waiter = instance.clone();
        let blocked = tokio::task::spawn_blocking(move || {
            let _r2 = waiter.reader_get();
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!blocked.is_finished());

        instance.reader_release(r1);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("second reader_get did not unblock after release")
            .unwrap();
    }

    /// P5: needs a primary down on 127.0.0.1:6379 and a reachable
    /// secondary on 127.0.0.1:6380 — `reader_exec` should fail over to
    /// the secondary within `reader_retry + 1` attempts.
    #[tokio::test]
    #[ignore]
    async fn failover_read_falls_back_to_secondary() {
        let mut instance = Instance::new(MeshConfig::new()).unwrap();
        instance.host_add("127.0.0.1", 6379).unwrap();
        instance.host_add("127.0.0.1", 6380).unwrap();
        instance.run_thr().unwrap();

        let get = redis::cmd("GET").arg("redis_mesh_failover_probe").get_packed_command();
        let mut reader = instance.reader_get();
        let replies = reader.exec(&[get]).expect("secondary should serve the read");
        instance.reader_release(reader);
        assert_eq!(replies.len(), 1);
    }

    /// P6: with the primary recovered, the next `reader_get` after the
    /// prior holder releases selects the primary again, not whichever
    /// secondary last served a failed-over read.
    #[tokio::test]
    #[ignore]
    async fn primary_recovery_reclaims_traffic() {
        let mut instance = Instance::new(MeshConfig::new()).unwrap();
        instance.host_add("127.0.0.1", 6379).unwrap();
        instance.host_add("127.0.0.1", 6380).unwrap();
        instance.run_thr().unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        let get = redis::cmd("PING").get_packed_command();
        let mut reader = instance.reader_get();
        reader.exec(&[get]).expect("primary should be reachable again");
        instance.reader_release(reader);
    }
}
