//! Snapshot sessions.
//!
//! A session wraps one engine snapshot plus the per-collection cursors
//! opened under it. It owns no synchronization; the registry hands it to
//! one caller at a time.

use crate::chunks::Chunk;
use snapsync_storage::{
    CollectionInfo, DocumentVersion, EngineSnapshot, SnapshotCursor, StorageResult, Tick,
};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creates a session id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A collection bound for key synchronization.
pub(crate) struct KeyBinding {
    pub(crate) info: CollectionInfo,
    pub(crate) cursor: Box<dyn SnapshotCursor>,
    /// Partition from the last `list_chunks`, if any.
    pub(crate) chunks: Option<Vec<Chunk>>,
}

/// Forward-only dump position of one collection.
pub(crate) struct DumpCursor {
    pub(crate) cursor: Box<dyn SnapshotCursor>,
    /// Entry read ahead to decide `check_more`.
    pub(crate) pending: Option<DocumentVersion>,
    pub(crate) exhausted: bool,
}

impl DumpCursor {
    pub(crate) fn new(cursor: Box<dyn SnapshotCursor>) -> Self {
        Self {
            cursor,
            pending: None,
            exhausted: false,
        }
    }

    pub(crate) fn next(&mut self) -> StorageResult<Option<DocumentVersion>> {
        if let Some(entry) = self.pending.take() {
            return Ok(Some(entry));
        }
        if self.exhausted {
            return Ok(None);
        }
        let entry = self.cursor.next_entry()?;
        self.exhausted = entry.is_none();
        Ok(entry)
    }

    pub(crate) fn peek(&mut self) -> StorageResult<bool> {
        if self.pending.is_none() {
            self.pending = self.next()?;
        }
        Ok(self.pending.is_some())
    }
}

/// One replication session: a pinned snapshot and the cursors opened on it.
///
/// # Invariants
///
/// - The snapshot never changes for the session's lifetime
/// - Every cursor reads from that snapshot
/// - Dropping the session releases the snapshot and all cursors
pub struct SnapshotSession {
    id: SessionId,
    database: String,
    last_access: Instant,
    ttl: Duration,
    snapshot: Box<dyn EngineSnapshot>,
    pub(crate) bindings: HashMap<String, KeyBinding>,
    pub(crate) dumps: HashMap<String, DumpCursor>,
}

impl SnapshotSession {
    pub(crate) fn new(
        id: SessionId,
        database: String,
        ttl: Duration,
        snapshot: Box<dyn EngineSnapshot>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            database,
            last_access: now,
            ttl,
            snapshot,
            bindings: HashMap::new(),
            dumps: HashMap::new(),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Database whose snapshot the session holds.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Latest log tick at the moment the snapshot was taken.
    #[must_use]
    pub fn last_tick(&self) -> Tick {
        self.snapshot.tick()
    }

    /// Current time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the session was last checked out.
    #[must_use]
    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    /// Names of the collections bound for key synchronization.
    #[must_use]
    pub fn bound_collections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn snapshot(&self) -> &dyn EngineSnapshot {
        self.snapshot.as_ref()
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    pub(crate) fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }
}

impl fmt::Debug for SnapshotSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSession")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("last_tick", &self.last_tick())
            .field("ttl", &self.ttl)
            .field("bindings", &self.bound_collections())
            .field("dumps", &self.dumps.len())
            .finish()
    }
}
