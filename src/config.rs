//! Instance-wide settings, separate from the live [`crate::Instance`] so
//! they can be constructed, validated and logged before anything is
//! connected.

use std::time::Duration;

pub(crate) const HOST_DISCONNECTED_RETRIES: u32 = 10;
pub(crate) const HOST_FAILED_RETRY_AFTER: u32 = 20;
pub(crate) const QUEUE_MAX_UNSHIFT: usize = 10_000;
pub(crate) const DEFAULT_HOST_READER_MAX: usize = 10;
pub(crate) const DEFAULT_HOST_TIMEOUT_MS: u64 = 5_000;
pub(crate) const DEFAULT_HOST_READER_RETRY: u32 = 1;
pub(crate) const HOST_FILE_MAX_BYTES: u64 = 16 * 1024;

/// Tunables for an [`crate::Instance`]: sync connect/IO timeout, reader
/// pool size and per-exec retry budget.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub(crate) sync_timeout: Duration,
    pub(crate) reader_max: usize,
    pub(crate) reader_retry: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            sync_timeout: Duration::from_millis(DEFAULT_HOST_TIMEOUT_MS),
            reader_max: DEFAULT_HOST_READER_MAX,
            reader_retry: DEFAULT_HOST_READER_RETRY,
        }
    }
}

impl MeshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both the sync connect and I/O timeout, in milliseconds.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.sync_timeout = Duration::from_millis(ms);
        self
    }

    /// Bounds the number of outstanding readers (default `10`).
    pub fn reader_max(mut self, max: usize) -> Self {
        self.reader_max = max;
        self
    }

    /// Bounds the number of host failovers per `reader_exec` call (default `1`).
    pub fn reader_retry(mut self, retry: u32) -> Self {
        self.reader_retry = retry;
        self
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.reader_max == 0 {
            return Err(crate::error::MeshError::Config(
                "reader_max must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
