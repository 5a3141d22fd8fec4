//! Lifecycle flags shared between an [`crate::Instance`] and its writer
//! engine: `InRun`, `InThr`, `Ready`, `Shutdown`. Mutated by the writer
//! task after startup, read advisory-style from anywhere else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

#[derive(Default)]
pub(crate) struct Flags {
    in_run: AtomicBool,
    in_thr: AtomicBool,
    ready: AtomicBool,
    shutdown: AtomicBool,
}

impl Flags {
    pub(crate) fn new() -> Self {
        Flags::default()
    }

    pub(crate) fn in_run(&self) -> bool {
        self.in_run.load(Ordering::Acquire)
    }
    pub(crate) fn set_in_run(&self) {
        self.in_run.store(true, Ordering::Release);
    }
    pub(crate) fn unset_in_run(&self) {
        self.in_run.store(false, Ordering::Release);
    }

    pub(crate) fn in_thr(&self) -> bool {
        self.in_thr.load(Ordering::Acquire)
    }
    pub(crate) fn set_in_thr(&self) {
        self.in_thr.store(true, Ordering::Release);
    }
    pub(crate) fn unset_in_thr(&self) {
        self.in_thr.store(false, Ordering::Release);
    }

    pub(crate) fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
    pub(crate) fn set_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) fn shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
    pub(crate) fn set_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// A "wait until the child posts ready" gate built from a single
/// mutex/condvar pair — the idiomatic-Rust substitute for the original
/// mutex-reacquire spin described in the module docs' `run_thr` handshake.
#[derive(Default)]
pub(crate) struct StartGate {
    posted: Mutex<bool>,
    cv: Condvar,
}

impl StartGate {
    pub(crate) fn new() -> Self {
        StartGate::default()
    }

    pub(crate) fn signal(&self) {
        let mut posted = self.posted.lock().unwrap();
        *posted = true;
        self.cv.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut posted = self.posted.lock().unwrap();
        while !*posted {
            posted = self.cv.wait(posted).unwrap();
        }
    }
}
