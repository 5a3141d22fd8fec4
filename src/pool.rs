//! Bounded pool of idle [`Reader`]s: acquire blocks when the pool is
//! exhausted and the allocation ceiling has been reached; release wakes
//! exactly one waiter.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use tracing::warn;

use crate::host::HostTable;
use crate::reader::Reader;

struct PoolState {
    idle: VecDeque<Reader>,
    allocated: usize,
}

pub(crate) struct ReaderPool {
    state: Mutex<PoolState>,
    not_empty: Condvar,
    hosts: Arc<HostTable>,
    timeout: std::time::Duration,
    reader_max: usize,
    reader_retry: u32,
}

impl ReaderPool {
    pub(crate) fn new(
        hosts: Arc<HostTable>,
        timeout: std::time::Duration,
        reader_max: usize,
        reader_retry: u32,
    ) -> Self {
        ReaderPool {
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                allocated: 0,
            }),
            not_empty: Condvar::new(),
            hosts,
            timeout,
            reader_max,
            reader_retry,
        }
    }

    /// Blocks until an idle reader is available or a fresh one can be
    /// allocated under `reader_max`.
    pub(crate) fn acquire(&self) -> Reader {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(mut reader) = state.idle.pop_front() {
                reader.free = false;
                return reader;
            }
            if state.allocated < self.reader_max {
                state.allocated += 1;
                return Reader::new(self.hosts.clone(), self.timeout, self.reader_retry);
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    pub(crate) fn release(&self, mut reader: Reader) {
        reader.free = true;
        let mut state = self.state.lock().unwrap();
        state.idle.push_back(reader);
        self.not_empty.notify_one();
    }

    /// Drains every idle reader, asserting each one is `free`. Used only
    /// by `Instance`'s teardown; a reader found not-`free` here means a
    /// caller leaked one past `Drop`, which should never happen by
    /// construction.
    pub(crate) fn drain_all(&self) -> Vec<Reader> {
        let mut state = self.state.lock().unwrap();
        let drained: Vec<Reader> = state.idle.drain(..).collect();
        for r in &drained {
            if !r.free {
                warn!("reader pool: drained reader not in 'free' state");
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    fn pool(max: usize) -> ReaderPool {
        let mut table = HostTable::new();
        table.push("127.0.0.1".into(), 6379);
        ReaderPool::new(StdArc::new(table), Duration::from_millis(50), max, 1)
    }

    #[test]
    fn acquire_allocates_up_to_max_then_reuses() {
        let p = pool(2);
        let r1 = p.acquire();
        let r2 = p.acquire();
        assert_eq!(p.state.lock().unwrap().allocated, 2);
        p.release(r1);
        p.release(r2);
        let _r3 = p.acquire();
        // Still only 2 ever allocated: reuse, not a third allocation.
        assert_eq!(p.state.lock().unwrap().allocated, 2);
    }

    #[test]
    fn third_acquire_blocks_until_a_release() {
        let p = StdArc::new(pool(2));
        let r1 = p.acquire();
        let _r2 = p.acquire();

        let p2 = p.clone();
        let handle = thread::spawn(move || {
            let _r3 = p2.acquire();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        p.release(r1);
        handle.join().unwrap();
    }
}
