//! Replication configuration.

use std::time::Duration;

/// Configuration of the session registry and the readers built on it.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// TTL of sessions created or renewed without an explicit TTL.
    pub default_ttl: Duration,
    /// Upper bound for requested TTLs. Larger requests are clamped.
    pub max_ttl: Duration,
    /// How often the background reaper scans for expired sessions.
    pub reaper_interval: Duration,
    /// Smallest accepted chunk or page size.
    pub min_chunk_size: usize,
    /// Number of log records read per batch while tailing.
    pub tail_read_batch: usize,
}

impl ReplicationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_ttl: Duration::from_secs(24 * 60 * 60),
            reaper_interval: Duration::from_secs(1),
            min_chunk_size: 1,
            tail_read_batch: 256,
        }
    }

    /// Sets the default session TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the maximum session TTL.
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Sets the reaper scan interval.
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Sets the minimum chunk size.
    pub fn with_min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size.max(1);
        self
    }

    /// Sets the log read batch size used by tailing.
    pub fn with_tail_read_batch(mut self, records: usize) -> Self {
        self.tail_read_batch = records.max(1);
        self
    }

    /// Resolves a requested TTL: `None` or zero means the default, and
    /// anything above `max_ttl` is clamped.
    #[must_use]
    pub fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        match requested {
            None => self.default_ttl,
            Some(ttl) if ttl.is_zero() => self.default_ttl,
            Some(ttl) if ttl > self.max_ttl => {
                tracing::warn!(
                    requested_secs = ttl.as_secs(),
                    max_secs = self.max_ttl.as_secs(),
                    "session ttl clamped"
                );
                self.max_ttl
            }
            Some(ttl) => ttl,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::new()
    }
}
