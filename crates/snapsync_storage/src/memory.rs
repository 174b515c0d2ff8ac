//! In-memory MVCC engine.
//!
//! Keeps every version of every document until no live snapshot can observe
//! it any more. Suitable for tests, the CLI and embedding.

use crate::engine::{ChangeLog, EngineSnapshot, SnapshotCursor, StorageEngine};
use crate::error::{StorageError, StorageResult};
use crate::log::{LogRecordKind, TxOutcome, WriteAheadLog};
use crate::transaction::{PendingOp, WriteTransaction};
use crate::types::{
    CollectionId, CollectionInfo, CollectionKind, DocumentVersion, Tick, TransactionId,
};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Version {
    tick: Tick,
    /// `None` marks a removal.
    body: Option<Bytes>,
}

#[derive(Debug)]
struct CollectionState {
    info: CollectionInfo,
    dropped_at: Option<Tick>,
    /// Versions per key, ascending by tick.
    documents: BTreeMap<String, Vec<Version>>,
}

impl CollectionState {
    fn is_live(&self) -> bool {
        self.dropped_at.is_none()
    }

    fn exists_at(&self, tick: Tick) -> bool {
        self.info.created_tick <= tick && self.dropped_at.map_or(true, |d| d > tick)
    }
}

/// Latest version of `versions` with a tick `<= tick`.
fn visible_at(versions: &[Version], tick: Tick) -> Option<&Version> {
    versions.iter().rev().find(|v| v.tick <= tick)
}

#[derive(Debug, Default)]
struct EngineState {
    databases: BTreeSet<String>,
    collections: BTreeMap<CollectionId, CollectionState>,
    next_collection_id: u64,
}

impl EngineState {
    fn require_database(&self, database: &str) -> StorageResult<()> {
        if self.databases.contains(database) {
            Ok(())
        } else {
            Err(StorageError::DatabaseNotFound(database.to_string()))
        }
    }

    fn live_collection(&self, database: &str, name: &str) -> Option<&CollectionState> {
        self.collections
            .values()
            .find(|c| c.is_live() && c.info.database == database && c.info.name == name)
    }

    fn resolve(&self, database: &str, name: &str) -> StorageResult<CollectionId> {
        self.require_database(database)?;
        self.live_collection(database, name)
            .map(|c| c.info.id)
            .ok_or_else(|| StorageError::collection_not_found(database, name))
    }

    fn install(&mut self, collection: CollectionId, key: String, version: Version) {
        if let Some(state) = self.collections.get_mut(&collection) {
            state.documents.entry(key).or_default().push(version);
        }
    }
}

/// Reference counts of live snapshots per tick.
#[derive(Debug, Default)]
struct SnapshotTracker {
    live: Mutex<BTreeMap<Tick, usize>>,
}

impl SnapshotTracker {
    fn pin(&self, tick: Tick) {
        *self.live.lock().entry(tick).or_insert(0) += 1;
    }

    fn unpin(&self, tick: Tick) {
        let mut live = self.live.lock();
        if let Some(count) = live.get_mut(&tick) {
            *count -= 1;
            if *count == 0 {
                live.remove(&tick);
            }
        }
    }

    fn oldest(&self) -> Option<Tick> {
        self.live.lock().keys().next().copied()
    }

    fn count(&self) -> usize {
        self.live.lock().values().sum()
    }
}

/// Keeps one snapshot tick pinned for as long as any holder exists.
#[derive(Debug)]
struct SnapshotPin {
    tick: Tick,
    tracker: Arc<SnapshotTracker>,
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        self.tracker.unpin(self.tick);
        tracing::trace!(tick = %self.tick, "snapshot released");
    }
}

/// In-memory storage engine with MVCC snapshots and a write-ahead change log.
///
/// # Thread Safety
///
/// All methods take `&self`; the engine can be shared behind an `Arc`.
/// Writes are serialized by the state lock, which is held across the log
/// append and the version install so that a snapshot tick always matches
/// the visible data exactly.
///
/// # Example
///
/// ```rust
/// use snapsync_storage::{CollectionKind, InMemoryEngine, StorageEngine};
///
/// let engine = InMemoryEngine::new();
/// engine.create_database("app").unwrap();
/// engine.create_collection("app", "users", CollectionKind::Document).unwrap();
/// let tick = engine.insert("app", "users", "alice", b"{}".to_vec()).unwrap();
/// assert_eq!(engine.snapshot().unwrap().tick(), tick);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: Arc<RwLock<EngineState>>,
    wal: WriteAheadLog,
    snapshots: Arc<SnapshotTracker>,
    next_txid: AtomicU64,
}

impl InMemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database. Databases are not logged.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateName`] if it already exists.
    pub fn create_database(&self, name: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.databases.insert(name.to_string()) {
            return Err(StorageError::DuplicateName(name.to_string()));
        }
        tracing::debug!(database = name, "database created");
        Ok(())
    }

    /// Creates a collection and logs the creation.
    ///
    /// # Errors
    ///
    /// Fails if the database is unknown or a live collection has this name.
    pub fn create_collection(
        &self,
        database: &str,
        name: &str,
        kind: CollectionKind,
    ) -> StorageResult<CollectionInfo> {
        let mut state = self.state.write();
        state.require_database(database)?;
        if state.live_collection(database, name).is_some() {
            return Err(StorageError::DuplicateName(format!("{database}/{name}")));
        }
        state.next_collection_id += 1;
        let id = CollectionId::new(state.next_collection_id);

        let mut info = CollectionInfo {
            id,
            name: name.to_string(),
            database: database.to_string(),
            kind,
            created_tick: Tick::ZERO,
        };
        let tick = self.wal.append_with(database, |tick| {
            info.created_tick = tick;
            LogRecordKind::CreateCollection { info: info.clone() }
        });
        info.created_tick = tick;

        state.collections.insert(
            id,
            CollectionState {
                info: info.clone(),
                dropped_at: None,
                documents: BTreeMap::new(),
            },
        );
        tracing::debug!(database, collection = name, %id, %tick, "collection created");
        Ok(info)
    }

    /// Drops a live collection. Snapshots older than the drop can still read it.
    ///
    /// # Errors
    ///
    /// Fails if the database or collection is unknown.
    pub fn drop_collection(&self, database: &str, name: &str) -> StorageResult<Tick> {
        let mut state = self.state.write();
        let id = state.resolve(database, name)?;
        let tick = self.wal.append(
            database,
            LogRecordKind::DropCollection {
                collection: id,
                name: name.to_string(),
            },
        );
        if let Some(collection) = state.collections.get_mut(&id) {
            collection.dropped_at = Some(tick);
        }
        tracing::debug!(database, collection = name, %tick, "collection dropped");
        Ok(tick)
    }

    /// Inserts or replaces a document as a standalone write.
    ///
    /// Returns the tick, which is also the new revision.
    ///
    /// # Errors
    ///
    /// Fails if the database or collection is unknown.
    pub fn insert(
        &self,
        database: &str,
        collection: &str,
        key: &str,
        body: impl Into<Bytes>,
    ) -> StorageResult<Tick> {
        let body = body.into();
        let mut state = self.state.write();
        let id = state.resolve(database, collection)?;
        let tick = self.wal.append(
            database,
            LogRecordKind::Insert {
                collection: id,
                key: key.to_string(),
                body: body.clone(),
            },
        );
        state.install(
            id,
            key.to_string(),
            Version {
                tick,
                body: Some(body),
            },
        );
        Ok(tick)
    }

    /// Removes a document as a standalone write.
    ///
    /// Returns `None` without logging anything if the key is not live.
    ///
    /// # Errors
    ///
    /// Fails if the database or collection is unknown.
    pub fn remove(&self, database: &str, collection: &str, key: &str) -> StorageResult<Option<Tick>> {
        let mut state = self.state.write();
        let id = state.resolve(database, collection)?;
        let exists = state
            .collections
            .get(&id)
            .and_then(|c| c.documents.get(key))
            .and_then(|versions| versions.last())
            .is_some_and(|v| v.body.is_some());
        if !exists {
            return Ok(None);
        }
        let tick = self.wal.append(
            database,
            LogRecordKind::Remove {
                collection: id,
                key: key.to_string(),
            },
        );
        state.install(id, key.to_string(), Version { tick, body: None });
        Ok(Some(tick))
    }

    /// Reads the latest committed version of a document.
    ///
    /// # Errors
    ///
    /// Fails if the database or collection is unknown.
    pub fn get(
        &self,
        database: &str,
        collection: &str,
        key: &str,
    ) -> StorageResult<Option<DocumentVersion>> {
        let state = self.state.read();
        let id = state.resolve(database, collection)?;
        let latest = state
            .collections
            .get(&id)
            .and_then(|c| c.documents.get(key))
            .and_then(|versions| versions.last());
        Ok(latest.and_then(|v| {
            v.body.clone().map(|body| DocumentVersion {
                key: key.to_string(),
                rev: v.tick,
                body,
            })
        }))
    }

    /// Counts the live documents of a collection.
    ///
    /// # Errors
    ///
    /// Fails if the database or collection is unknown.
    pub fn count(&self, database: &str, collection: &str) -> StorageResult<usize> {
        let state = self.state.read();
        let id = state.resolve(database, collection)?;
        Ok(state.collections.get(&id).map_or(0, |c| {
            c.documents
                .values()
                .filter(|versions| versions.last().is_some_and(|v| v.body.is_some()))
                .count()
        }))
    }

    /// Starts a write transaction on one database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DatabaseNotFound`] for unknown databases.
    pub fn begin(&self, database: &str) -> StorageResult<WriteTransaction<'_>> {
        self.state.read().require_database(database)?;
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(WriteTransaction::new(self, database.to_string(), txid))
    }

    /// Resolves a live collection name for a pending transaction.
    pub(crate) fn resolve_collection(
        &self,
        database: &str,
        name: &str,
    ) -> StorageResult<CollectionId> {
        self.state.read().resolve(database, name)
    }

    /// Logs a finished transaction and, on commit, installs its versions.
    ///
    /// Returns the tick of the last operation, or `None` if nothing was logged.
    pub(crate) fn finish_transaction(
        &self,
        database: &str,
        txid: TransactionId,
        ops: Vec<PendingOp>,
        outcome: TxOutcome,
    ) -> StorageResult<Option<Tick>> {
        if ops.is_empty() {
            return Ok(None);
        }
        let mut state = self.state.write();

        let mut outcome = outcome;
        if outcome == TxOutcome::Committed {
            if let Some(op) = ops
                .iter()
                .find(|op| !state.collections.get(&op.collection()).is_some_and(|c| c.is_live()))
            {
                // A collection went away underneath us; log the fragment as aborted.
                outcome = TxOutcome::Aborted;
                self.wal.append_transaction(
                    database,
                    txid,
                    ops.iter().map(PendingOp::to_record).collect(),
                    outcome,
                );
                return Err(StorageError::UnknownCollection(op.collection()));
            }
        }

        let ticks = self.wal.append_transaction(
            database,
            txid,
            ops.iter().map(PendingOp::to_record).collect(),
            outcome,
        );
        if outcome == TxOutcome::Committed {
            for (op, tick) in ops.into_iter().zip(ticks.iter().copied()) {
                match op {
                    PendingOp::Put {
                        collection,
                        key,
                        body,
                    } => state.install(
                        collection,
                        key,
                        Version {
                            tick,
                            body: Some(body),
                        },
                    ),
                    PendingOp::Remove { collection, key } => {
                        state.install(collection, key, Version { tick, body: None });
                    }
                }
            }
        }
        tracing::debug!(%txid, ?outcome, ops = ticks.len(), "transaction logged");
        Ok(ticks.last().copied())
    }

    /// Discards versions that no live snapshot can observe any more, and
    /// dropped collections no live snapshot predates.
    ///
    /// Returns the number of versions removed.
    pub fn purge_versions(&self) -> usize {
        let mut state = self.state.write();
        let horizon = self.snapshots.oldest().unwrap_or_else(|| self.wal.latest_tick());
        let mut removed = 0;

        let before = state.collections.len();
        state.collections.retain(|_, c| match c.dropped_at {
            Some(dropped) if dropped <= horizon => {
                removed += c.documents.values().map(Vec::len).sum::<usize>();
                false
            }
            _ => true,
        });
        let dropped_collections = before - state.collections.len();

        for collection in state.collections.values_mut() {
            collection.documents.retain(|_, versions| {
                // keep the version visible at the horizon and everything newer
                let keep_from = versions
                    .iter()
                    .rposition(|v| v.tick <= horizon)
                    .unwrap_or(0);
                removed += keep_from;
                versions.drain(..keep_from);
                let dead = versions.len() == 1
                    && versions[0].tick <= horizon
                    && versions[0].body.is_none();
                if dead {
                    removed += 1;
                }
                !dead
            });
        }
        tracing::debug!(%horizon, removed, dropped_collections, "versions purged");
        removed
    }

    /// Drops change-log records with a tick `<= tick`.
    pub fn prune_log_through(&self, tick: Tick) -> usize {
        let removed = self.wal.prune_through(tick);
        tracing::debug!(%tick, removed, "change log pruned");
        removed
    }

    /// Number of snapshot handles currently alive.
    #[must_use]
    pub fn live_snapshot_count(&self) -> usize {
        self.snapshots.count()
    }

    /// Direct access to the write-ahead log.
    #[must_use]
    pub fn wal(&self) -> &WriteAheadLog {
        &self.wal
    }
}

impl StorageEngine for InMemoryEngine {
    fn databases(&self) -> Vec<String> {
        self.state.read().databases.iter().cloned().collect()
    }

    fn collections(&self, database: &str) -> StorageResult<Vec<CollectionInfo>> {
        let state = self.state.read();
        state.require_database(database)?;
        Ok(state
            .collections
            .values()
            .filter(|c| c.is_live() && c.info.database == database)
            .map(|c| c.info.clone())
            .collect())
    }

    fn collection(&self, database: &str, name: &str) -> StorageResult<Option<CollectionInfo>> {
        let state = self.state.read();
        state.require_database(database)?;
        Ok(state.live_collection(database, name).map(|c| c.info.clone()))
    }

    fn collection_by_id(&self, id: CollectionId) -> Option<CollectionInfo> {
        self.state.read().collections.get(&id).map(|c| c.info.clone())
    }

    fn snapshot(&self) -> StorageResult<Box<dyn EngineSnapshot>> {
        // the read lock excludes writers, so the tick matches the installed versions
        let _state = self.state.read();
        let tick = self.wal.latest_tick();
        self.snapshots.pin(tick);
        tracing::trace!(%tick, "snapshot acquired");
        Ok(Box::new(MemorySnapshot {
            pin: Arc::new(SnapshotPin {
                tick,
                tracker: Arc::clone(&self.snapshots),
            }),
            state: Arc::clone(&self.state),
        }))
    }

    fn log(&self) -> &dyn ChangeLog {
        &self.wal
    }
}

struct MemorySnapshot {
    pin: Arc<SnapshotPin>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineSnapshot for MemorySnapshot {
    fn tick(&self) -> Tick {
        self.pin.tick
    }

    fn collection(&self, database: &str, name: &str) -> StorageResult<Option<CollectionInfo>> {
        let state = self.state.read();
        state.require_database(database)?;
        Ok(state
            .collections
            .values()
            .find(|c| {
                c.info.database == database && c.info.name == name && c.exists_at(self.pin.tick)
            })
            .map(|c| c.info.clone()))
    }

    fn cursor(&self, collection: CollectionId) -> StorageResult<Box<dyn SnapshotCursor>> {
        let state = self.state.read();
        match state.collections.get(&collection) {
            Some(c) if c.exists_at(self.pin.tick) => Ok(Box::new(MemoryCursor {
                pin: Arc::clone(&self.pin),
                state: Arc::clone(&self.state),
                collection,
                position: Bound::Unbounded,
            })),
            _ => Err(StorageError::UnknownCollection(collection)),
        }
    }
}

struct MemoryCursor {
    pin: Arc<SnapshotPin>,
    state: Arc<RwLock<EngineState>>,
    collection: CollectionId,
    /// Lower bound of the next key to read.
    position: Bound<String>,
}

impl SnapshotCursor for MemoryCursor {
    fn seek_to_first(&mut self) {
        self.position = Bound::Unbounded;
    }

    fn seek(&mut self, key: &str) {
        self.position = Bound::Included(key.to_string());
    }

    fn next_entry(&mut self) -> StorageResult<Option<DocumentVersion>> {
        let tick = self.pin.tick;
        let state = self.state.read();
        let collection = state
            .collections
            .get(&self.collection)
            .ok_or(StorageError::SnapshotReleased)?;

        let range = collection
            .documents
            .range::<String, _>((self.position.clone(), Bound::Unbounded));
        for (key, versions) in range {
            if let Some(Version {
                tick: rev,
                body: Some(body),
            }) = visible_at(versions, tick)
            {
                let entry = DocumentVersion {
                    key: key.clone(),
                    rev: *rev,
                    body: body.clone(),
                };
                self.position = Bound::Excluded(key.clone());
                return Ok(Some(entry));
            }
        }
        // exhausted: park after the last key so further calls stay cheap
        if let Some(last) = collection.documents.keys().next_back() {
            self.position = Bound::Excluded(last.clone());
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine.create_database("db").unwrap();
        engine
            .create_collection("db", "users", CollectionKind::Document)
            .unwrap();
        engine
    }

    fn drain(cursor: &mut dyn SnapshotCursor) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        while let Some(doc) = cursor.next_entry().unwrap() {
            out.push((doc.key, doc.rev.as_u64()));
        }
        out
    }

    #[test]
    fn ticks_start_at_one() {
        let engine = InMemoryEngine::new();
        engine.create_database("db").unwrap();
        let info = engine
            .create_collection("db", "c", CollectionKind::Edge)
            .unwrap();
        assert_eq!(info.created_tick, Tick::new(1));
        assert_eq!(engine.insert("db", "c", "k", "v").unwrap(), Tick::new(2));
    }

    #[test]
    fn duplicate_names_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.create_database("db"),
            Err(StorageError::DuplicateName(_))
        ));
        assert!(matches!(
            engine.create_collection("db", "users", CollectionKind::Document),
            Err(StorageError::DuplicateName(_))
        ));
    }

    #[test]
    fn snapshot_isolation() {
        let engine = engine();
        engine.insert("db", "users", "a", "1").unwrap();
        engine.insert("db", "users", "b", "1").unwrap();
        let id = engine.collection("db", "users").unwrap().unwrap().id;

        let snapshot = engine.snapshot().unwrap();
        engine.insert("db", "users", "c", "1").unwrap();
        engine.insert("db", "users", "a", "2").unwrap();
        engine.remove("db", "users", "b").unwrap();

        let mut cursor = snapshot.cursor(id).unwrap();
        assert_eq!(drain(cursor.as_mut()), vec![("a".into(), 2), ("b".into(), 3)]);

        let fresh = engine.snapshot().unwrap();
        let mut cursor = fresh.cursor(id).unwrap();
        let keys: Vec<String> = drain(cursor.as_mut()).into_iter().map(|e| e.0).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn cursor_seek() {
        let engine = engine();
        for key in ["a", "c", "e"] {
            engine.insert("db", "users", key, "x").unwrap();
        }
        let id = engine.collection("db", "users").unwrap().unwrap().id;
        let snapshot = engine.snapshot().unwrap();
        let mut cursor = snapshot.cursor(id).unwrap();

        cursor.seek("b");
        assert_eq!(cursor.next_entry().unwrap().unwrap().key, "c");
        cursor.seek("e");
        assert_eq!(cursor.next_entry().unwrap().unwrap().key, "e");
        assert!(cursor.next_entry().unwrap().is_none());
        cursor.seek_to_first();
        assert_eq!(cursor.next_entry().unwrap().unwrap().key, "a");
    }

    #[test]
    fn dropped_collection_visible_to_older_snapshot() {
        let engine = engine();
        engine.insert("db", "users", "a", "1").unwrap();
        let id = engine.collection("db", "users").unwrap().unwrap().id;
        let snapshot = engine.snapshot().unwrap();
        engine.drop_collection("db", "users").unwrap();

        assert!(engine.collection("db", "users").unwrap().is_none());
        engine.purge_versions();
        let mut cursor = snapshot.cursor(id).unwrap();
        assert_eq!(drain(cursor.as_mut()).len(), 1);

        drop(cursor);
        drop(snapshot);
        engine.purge_versions();
        assert!(engine.snapshot().unwrap().cursor(id).is_err());
    }

    #[test]
    fn snapshot_resolves_names_at_its_tick() {
        let engine = engine();
        engine.insert("db", "users", "a", "1").unwrap();
        let old = engine.collection("db", "users").unwrap().unwrap();
        let before = engine.snapshot().unwrap();
        engine.drop_collection("db", "users").unwrap();
        let between = engine.snapshot().unwrap();
        let new = engine
            .create_collection("db", "users", CollectionKind::Document)
            .unwrap();
        let after = engine.snapshot().unwrap();

        assert_eq!(before.collection("db", "users").unwrap().unwrap().id, old.id);
        assert!(between.collection("db", "users").unwrap().is_none());
        assert_eq!(after.collection("db", "users").unwrap().unwrap().id, new.id);
        assert!(before.collection("nope", "users").is_err());
    }

    #[test]
    fn snapshot_tracking() {
        let engine = engine();
        assert_eq!(engine.live_snapshot_count(), 0);
        let s1 = engine.snapshot().unwrap();
        let s2 = engine.snapshot().unwrap();
        assert_eq!(engine.live_snapshot_count(), 2);

        let id = engine.collection("db", "users").unwrap().unwrap().id;
        let cursor = s1.cursor(id).unwrap();
        drop(s1);
        // the cursor keeps its snapshot pinned
        assert_eq!(engine.live_snapshot_count(), 2);
        drop(cursor);
        drop(s2);
        assert_eq!(engine.live_snapshot_count(), 0);
    }

    #[test]
    fn purge_respects_live_snapshots() {
        let engine = engine();
        engine.insert("db", "users", "a", "1").unwrap();
        engine.insert("db", "users", "a", "2").unwrap();
        let id = engine.collection("db", "users").unwrap().unwrap().id;
        let old = engine.snapshot().unwrap();
        engine.insert("db", "users", "a", "3").unwrap();

        // only "1" is invisible to every live snapshot
        assert_eq!(engine.purge_versions(), 1);
        let mut cursor = old.cursor(id).unwrap();
        assert_eq!(cursor.next_entry().unwrap().unwrap().body, Bytes::from("2"));
        drop(cursor);
        drop(old);

        assert_eq!(engine.purge_versions(), 1);
        assert_eq!(
            engine.get("db", "users", "a").unwrap().unwrap().body,
            Bytes::from("3")
        );
    }

    #[test]
    fn remove_missing_key_is_not_logged() {
        let engine = engine();
        let before = engine.wal().latest_tick();
        assert_eq!(engine.remove("db", "users", "nope").unwrap(), None);
        assert_eq!(engine.wal().latest_tick(), before);
    }

    #[test]
    fn unknown_names() {
        let engine = engine();
        assert!(engine.insert("nope", "users", "a", "1").unwrap_err().is_not_found());
        assert!(engine.insert("db", "nope", "a", "1").unwrap_err().is_not_found());
        assert!(engine.collections("nope").is_err());
    }
}
