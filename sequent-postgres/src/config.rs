//! PostgreSQL event store configuration.
//!
//! [`PgEventStoreConfig`] is a recognised-options record: when deserialized (for
//! example from an application config file), unknown keys are rejected and absent
//! fields take their defaults.
use sequent::DEFAULT_STREAM_BUFFER;
use serde::Deserialize;
use std::time::Duration;

/// Isolation level of the append transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendIsolation {
    /// PostgreSQL `READ COMMITTED`; tail insertion is serialized by the advisory
    /// lock, so the condition check is still sound.
    #[default]
    ReadCommitted,
    /// PostgreSQL `SERIALIZABLE`.
    Serializable,
}

/// PostgreSQL event store configuration.
///
/// # Properties
///
/// * `max_batch_size`: the largest batch a single append accepts.
/// * `lock_timeout_ms`: how long an append may wait for the log tail lock.
/// * `read_timeout_ms`: the time budget of a single read or scan page.
/// * `stream_buffer`: the capacity of the channels produced by the streaming
///   surface.
/// * `append_isolation`: the isolation level of append transactions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PgEventStoreConfig {
    max_batch_size: usize,
    lock_timeout_ms: u64,
    read_timeout_ms: u64,
    stream_buffer: usize,
    append_isolation: AppendIsolation,
}

impl Default for PgEventStoreConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            lock_timeout_ms: 5000,
            read_timeout_ms: 15000,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            append_isolation: AppendIsolation::default(),
        }
    }
}

impl PgEventStoreConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest batch a single append accepts.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Sets how long an append may wait for the log tail lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout_ms = lock_timeout.as_millis() as u64;
        self
    }

    /// Sets the time budget of a single read or scan page.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout_ms = read_timeout.as_millis() as u64;
        self
    }

    /// Sets the capacity of the channels produced by the streaming surface.
    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }

    /// Sets the isolation level of append transactions.
    pub fn with_append_isolation(mut self, append_isolation: AppendIsolation) -> Self {
        self.append_isolation = append_isolation;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer
    }

    pub fn append_isolation(&self) -> AppendIsolation {
        self.append_isolation
    }
}
