//! Embeddable multi-host Redis client.
//!
//! An [`Instance`] fans every write out to a configured set of hosts and
//! serves reads from a bounded pool of synchronous connections that fail
//! over between hosts, preferring the first host in the list whenever
//! it's not marked `Failed`.
//!
//! The design splits cleanly in two:
//!
//! - A single async writer engine (see `writer`) owns a fire-and-forget
//!   connection per host, drains the write queue, and runs the
//!   reconnect/cooldown sweep on a one-second tick. It's the only writer
//!   of host connection state.
//! - A pool of blocking [`Reader`]s (see `pool`), each a plain
//!   `redis::Connection`, read that state advisory-style to pick a host,
//!   retrying against the next one on a transport error.
//!
//! Host status and failure counters live behind relaxed atomics in
//! `host::HostState` so readers never block on the writer engine, and the
//! writer engine never blocks on a reader.
//!
//! Run the engine either blocking the calling thread with
//! [`Instance::run`], or on a dedicated thread with [`Instance::run_thr`].

pub use redis;

mod conn;
mod config;
mod error;
mod flags;
mod host;
mod instance;
mod pool;
mod queue;
mod reader;
mod writer;

pub use config::MeshConfig;
pub use error::{MeshError, Result};
pub use host::HostStatus;
pub use instance::Instance;
pub use reader::Reader;
