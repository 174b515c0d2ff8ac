//! Server configuration.

use snapsync_core::ReplicationConfig;
use std::time::Duration;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Configuration of the replication request handler.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Keys per chunk when the request gives none or a too small value.
    pub default_chunk_size: usize,
    /// Requests below this chunk size get the default.
    pub min_chunk_size: usize,
    /// Upper bound for requested chunk sizes.
    pub max_chunk_size: usize,
    /// Byte budget of a tail response without an explicit chunk size.
    pub default_tail_budget: usize,
    /// Byte budget of a docs page when the client sends an offset.
    pub docs_page_budget: usize,
    /// Byte budget of a dump batch without an explicit chunk size.
    pub default_dump_budget: usize,
    /// Smallest accepted dump budget.
    pub min_dump_budget: usize,
    /// Largest accepted dump budget.
    pub max_dump_budget: usize,
    /// Followers not seen for this long stop holding back log pruning.
    pub client_ttl: Duration,
    /// Whether the server runs a background session reaper.
    pub spawn_reaper: bool,
    /// Session registry configuration.
    pub replication: ReplicationConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            default_chunk_size: 5000,
            min_chunk_size: 100,
            max_chunk_size: 20_000,
            default_tail_budget: MIB,
            docs_page_budget: 8 * MIB,
            default_dump_budget: 128 * KIB,
            min_dump_budget: 16 * KIB,
            max_dump_budget: 128 * MIB,
            client_ttl: Duration::from_secs(2 * 60 * 60),
            spawn_reaper: true,
            replication: ReplicationConfig::default(),
        }
    }

    /// Sets the default chunk size.
    pub fn with_default_chunk_size(mut self, size: usize) -> Self {
        self.default_chunk_size = size;
        self
    }

    /// Sets the minimum chunk size.
    pub fn with_min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }

    /// Sets the maximum chunk size.
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Sets the default tail budget.
    pub fn with_default_tail_budget(mut self, bytes: usize) -> Self {
        self.default_tail_budget = bytes;
        self
    }

    /// Sets the docs page budget.
    pub fn with_docs_page_budget(mut self, bytes: usize) -> Self {
        self.docs_page_budget = bytes;
        self
    }

    /// Sets the default dump budget.
    pub fn with_default_dump_budget(mut self, bytes: usize) -> Self {
        self.default_dump_budget = bytes;
        self
    }

    /// Sets how long an idle follower is remembered.
    pub fn with_client_ttl(mut self, ttl: Duration) -> Self {
        self.client_ttl = ttl;
        self
    }

    /// Enables or disables the background reaper.
    pub fn with_reaper(mut self, spawn: bool) -> Self {
        self.spawn_reaper = spawn;
        self
    }

    /// Sets the session registry configuration.
    pub fn with_replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = replication;
        self
    }

    /// Chunk size to use for a requested value.
    pub fn chunk_size(&self, requested: Option<u64>) -> usize {
        match requested.map(saturating_usize) {
            Some(size) if size >= self.min_chunk_size => size.min(self.max_chunk_size),
            _ => self.default_chunk_size,
        }
    }

    /// Tail byte budget for a requested value.
    pub fn tail_budget(&self, requested: Option<u64>) -> usize {
        match requested.map(saturating_usize) {
            Some(bytes) if bytes > 0 => bytes,
            _ => self.default_tail_budget,
        }
    }

    /// Dump byte budget for a requested value.
    pub fn dump_budget(&self, requested: Option<u64>) -> usize {
        requested
            .map(saturating_usize)
            .unwrap_or(self.default_dump_budget)
            .clamp(self.min_dump_budget, self.max_dump_budget)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
