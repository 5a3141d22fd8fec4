//! Host table and the three-state connection state machine described in
//! module docs: `Disconnected -> Connected -> Failed`, with bounded
//! retry counters (`HOST_DISCONNECTED_RETRIES`, `HOST_FAILED_RETRY_AFTER`).

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{HOST_DISCONNECTED_RETRIES, HOST_FAILED_RETRY_AFTER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostStatus {
    Disconnected = 0,
    Connected = 1,
    Failed = 2,
}

impl HostStatus {
    fn from_u8(v: u8) -> HostStatus {
        match v {
            1 => HostStatus::Connected,
            2 => HostStatus::Failed,
            _ => HostStatus::Disconnected,
        }
    }
}

/// Immutable identity of a host: `target` is a hostname/IP when `port != 0`,
/// or a local-socket path when `port == 0`.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub target: String,
    pub port: u16,
}

impl HostInfo {
    pub fn is_unix(&self) -> bool {
        self.port == 0
    }
}

/// Lock-free, shared view of one host's live state. Written only by the
/// writer engine; read advisory-style (no lock) by reader threads.
#[derive(Debug)]
pub struct HostState {
    status: AtomicU8,
    failures: AtomicU32,
}

impl HostState {
    fn new() -> Self {
        HostState {
            status: AtomicU8::new(HostStatus::Disconnected as u8),
            failures: AtomicU32::new(0),
        }
    }

    pub fn status(&self) -> HostStatus {
        HostStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    fn set(&self, status: HostStatus, failures: u32) {
        self.failures.store(failures, Ordering::Relaxed);
        self.status.store(status as u8, Ordering::Relaxed);
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// The ordered set of hosts an `Instance` fans writes out to and reads
/// fail over across. `hosts[0]` is the primary (see the host-selection
/// policy in `pool.rs`).
#[derive(Debug, Default)]
pub struct HostTable {
    pub(crate) infos: Vec<HostInfo>,
    pub(crate) states: Vec<Arc<HostState>>,
}

impl HostTable {
    pub fn new() -> Self {
        HostTable::default()
    }

    pub fn push(&mut self, target: String, port: u16) {
        debug!(target = %target, port, "adding host");
        self.infos.push(HostInfo { target, port });
        self.states.push(Arc::new(HostState::new()));
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn info(&self, idx: usize) -> &HostInfo {
        &self.infos[idx]
    }

    pub fn state(&self, idx: usize) -> &Arc<HostState> {
        &self.states[idx]
    }

    /// Number of hosts currently `Connected`. O(n); call only at
    /// quiescent points (tests, metrics), not on a hot path.
    pub fn hosts_connected(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.status() == HostStatus::Connected)
            .count()
    }

    /// Applies a successful connect: `Disconnected|Failed -> Connected`.
    pub(crate) fn on_connect_ok(&self, idx: usize) {
        let st = &self.states[idx];
        st.set(HostStatus::Connected, 0);
        debug!(target = %self.infos[idx].target, "connected");
    }

    /// Applies a connect failure, advancing the state machine per host.
    pub(crate) fn on_connect_fail(&self, idx: usize) {
        let st = &self.states[idx];
        match st.status() {
            HostStatus::Failed => {
                let next = (st.failures() % HOST_FAILED_RETRY_AFTER) + 1;
                st.set(HostStatus::Failed, next);
            }
            HostStatus::Disconnected => {
                let next = st.failures() + 1;
                if next > HOST_DISCONNECTED_RETRIES {
                    st.set(HostStatus::Failed, 0);
                    warn!(target = %self.infos[idx].target, "host marked failed");
                } else {
                    st.set(HostStatus::Disconnected, next);
                }
            }
            HostStatus::Connected => {
                // A connect failure can't happen against an already-connected
                // host; ignore defensively.
            }
        }
    }

    /// Applies a disconnect: `Connected -> Disconnected`.
    pub(crate) fn on_disconnect(&self, idx: usize) {
        let st = &self.states[idx];
        st.set(HostStatus::Disconnected, 0);
        debug!(target = %self.infos[idx].target, "disconnected");
    }

    /// `true` once every host is either `Connected` or has recorded at
    /// least one failure (the "ready" sweep condition).
    pub(crate) fn all_settled(&self) -> bool {
        self.states
            .iter()
            .all(|s| s.status() == HostStatus::Connected || s.failures() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_retries_then_fails() {
        let mut table = HostTable::new();
        table.push("127.0.0.1".into(), 6379);

        for _ in 0..HOST_DISCONNECTED_RETRIES {
            table.on_connect_fail(0);
            assert_eq!(table.state(0).status(), HostStatus::Disconnected);
        }
        table.on_connect_fail(0);
        assert_eq!(table.state(0).status(), HostStatus::Failed);
        assert_eq!(table.state(0).failures(), 0);
    }

    #[test]
    fn connect_resets_failures() {
        let mut table = HostTable::new();
        table.push("127.0.0.1".into(), 6379);
        table.on_connect_fail(0);
        table.on_connect_fail(0);
        table.on_connect_ok(0);
        assert_eq!(table.state(0).status(), HostStatus::Connected);
        assert_eq!(table.state(0).failures(), 0);
    }

    #[test]
    fn failed_cooldown_wraps_modulo_retry_after() {
        let mut table = HostTable::new();
        table.push("127.0.0.1".into(), 6379);
        for _ in 0..=HOST_DISCONNECTED_RETRIES {
            table.on_connect_fail(0);
        }
        assert_eq!(table.state(0).status(), HostStatus::Failed);

        for i in 1..=(HOST_FAILED_RETRY_AFTER + 1) {
            table.on_connect_fail(0);
            assert_eq!(table.state(0).failures(), (i - 1) % HOST_FAILED_RETRY_AFTER + 1);
        }
    }

    #[test]
    fn disconnect_resets_to_disconnected() {
        let mut table = HostTable::new();
        table.push("127.0.0.1".into(), 6379);
        table.on_connect_ok(0);
        table.on_disconnect(0);
        assert_eq!(table.state(0).status(), HostStatus::Disconnected);
        assert_eq!(table.state(0).failures(), 0);
    }

    #[test]
    fn all_settled_requires_every_host() {
        let mut table = HostTable::new();
        table.push("a".into(), 1);
        table.push("b".into(), 2);
        assert!(!table.all_settled());
        table.on_connect_ok(0);
        assert!(!table.all_settled());
        table.on_connect_fail(1);
        assert!(table.all_settled());
    }
}
