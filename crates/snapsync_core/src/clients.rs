//! Progress of known replication clients.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use snapsync_storage::Tick;
use std::collections::HashMap;

/// What the leader knows about one follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientProgress {
    /// Highest tick served to the follower.
    pub last_served_tick: Tick,
    /// Last time the follower was seen.
    pub last_seen: DateTime<Utc>,
}

/// Table of followers and the ticks they were last served.
///
/// Log retention consults [`min_served_tick`](Self::min_served_tick) so
/// that records a registered follower still needs are never pruned.
#[derive(Debug, Default)]
pub struct ReplicationClients {
    clients: RwLock<HashMap<String, ClientProgress>>,
}

impl ReplicationClients {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `server_id` was served up to `tick`.
    ///
    /// An empty id or `"none"` disables tracking for that call.
    pub fn record(&self, server_id: &str, tick: Tick) {
        if server_id.is_empty() || server_id == "none" {
            return;
        }
        let now = Utc::now();
        let mut clients = self.clients.write();
        clients
            .entry(server_id.to_string())
            .and_modify(|p| {
                p.last_served_tick = tick;
                p.last_seen = now;
            })
            .or_insert(ClientProgress {
                last_served_tick: tick,
                last_seen: now,
            });
        tracing::trace!(server_id, %tick, "client progress recorded");
    }

    /// Progress of one follower.
    #[must_use]
    pub fn get(&self, server_id: &str) -> Option<ClientProgress> {
        self.clients.read().get(server_id).copied()
    }

    /// Smallest tick served to any registered follower.
    #[must_use]
    pub fn min_served_tick(&self) -> Option<Tick> {
        self.clients
            .read()
            .values()
            .map(|p| p.last_served_tick)
            .min()
    }

    /// Forgets followers not seen since `cutoff`. Returns how many were dropped.
    pub fn expire_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|_, p| p.last_seen >= cutoff);
        before - clients.len()
    }

    /// Forgets followers idle for longer than `ttl`. Returns how many were
    /// dropped.
    pub fn expire_idle(&self, ttl: std::time::Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };
        let expired = self.expire_before(cutoff);
        if expired > 0 {
            tracing::debug!(expired, ttl_secs = ttl.as_secs(), "idle clients forgotten");
        }
        expired
    }

    /// Number of registered followers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns true if no follower is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
