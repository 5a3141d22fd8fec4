//! Thread-safe FIFO of commands awaiting fan-out.
//!
//! `append` is unbounded; `unshift` (re-queue on failed delivery) is
//! capped at [`QUEUE_MAX_UNSHIFT`] so a sustained total outage can't grow
//! the queue without bound.
//!
//! Entries are `redis::Cmd` rather than raw bytes: the real async codec
//! collaborator (`redis::aio::MultiplexedConnection::req_packed_command`)
//! takes a `Cmd`, which packs itself lazily, so there's no byte buffer to
//! own ahead of time on this path — unlike the synchronous `Reader`,
//! whose pipelining API genuinely is byte-oriented (see `reader.rs`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use redis::Cmd;
use tokio::sync::Notify;
use tracing::warn;

use crate::config::QUEUE_MAX_UNSHIFT;
use crate::error::MeshError;

pub(crate) struct WriteQueue {
    entries: Mutex<VecDeque<Cmd>>,
    wakeup: Notify,
    pending: AtomicBool,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        WriteQueue {
            entries: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            pending: AtomicBool::new(false),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub(crate) fn append(&self, cmd: Cmd) {
        self.entries.lock().unwrap().push_back(cmd);
    }

    pub(crate) fn shift(&self) -> Option<Cmd> {
        self.entries.lock().unwrap().pop_front()
    }

    /// Re-inserts `cmd` at the head. Drops and logs it if the queue is
    /// already at [`QUEUE_MAX_UNSHIFT`] — delivered-nowhere commands are
    /// lost under sustained outage, by design.
    pub(crate) fn unshift(&self, cmd: Cmd) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= QUEUE_MAX_UNSHIFT {
            let dropped = MeshError::QueueDropped;
            warn!(queue_len = entries.len(), %dropped);
            return;
        }
        entries.push_front(cmd);
    }

    /// No-op unless `ready && !shutdown && !already pending`; otherwise
    /// marks a drain pending and wakes the writer engine. Keeps wakeups
    /// at most one per drain cycle regardless of producer rate.
    pub(crate) fn trigger(&self, ready: bool, shutdown: bool) {
        if !ready || shutdown {
            return;
        }
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.wakeup.notify_one();
        }
    }

    /// Force a wakeup regardless of the pending flag (used once at the
    /// moment the engine becomes ready).
    pub(crate) fn force_wake(&self) {
        self.pending.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    pub(crate) async fn wait_wakeup(&self) {
        self.wakeup.notified().await;
    }

    /// Cleared at the top of the drain callback.
    pub(crate) fn clear_pending(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Drains every remaining entry (used by `Instance`'s `Drop`).
    pub(crate) fn drain_all(&self) -> Vec<Cmd> {
        self.entries.lock().unwrap().drain(..).collect()
    }
}
