//! Storage engine capability traits.
//!
//! The replication layer only ever reads through these traits. It never
//! interprets document bodies and never writes.

use crate::error::StorageResult;
use crate::log::{LogRecord, TxOutcome};
use crate::types::{CollectionId, CollectionInfo, DocumentVersion, Tick, TransactionId};

/// A storage engine that can hand out point-in-time snapshots.
///
/// # Invariants
///
/// - A snapshot observes every write with a tick `<=` its own tick and none after
/// - Catalog queries (`collections`, `collection`) reflect the live state
/// - Implementations must be `Send + Sync`; one engine serves all requests
pub trait StorageEngine: Send + Sync {
    /// Returns the names of all databases, sorted.
    fn databases(&self) -> Vec<String>;

    /// Returns the live collections of a database, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::DatabaseNotFound`] for unknown databases.
    fn collections(&self, database: &str) -> StorageResult<Vec<CollectionInfo>>;

    /// Looks up a live collection by name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::DatabaseNotFound`] for unknown databases.
    fn collection(&self, database: &str, name: &str) -> StorageResult<Option<CollectionInfo>>;

    /// Looks up a collection by id, including dropped collections whose
    /// data is still retained for older snapshots.
    fn collection_by_id(&self, id: CollectionId) -> Option<CollectionInfo>;

    /// Acquires a snapshot of the current committed state.
    ///
    /// The snapshot stays valid until the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot pin a new snapshot.
    fn snapshot(&self) -> StorageResult<Box<dyn EngineSnapshot>>;

    /// Returns the engine's change log.
    fn log(&self) -> &dyn ChangeLog;
}

/// A pinned, read-only view of the engine at one tick.
pub trait EngineSnapshot: Send {
    /// Tick the snapshot was taken at.
    fn tick(&self) -> Tick;

    /// Looks up a collection by name as it existed at the snapshot tick.
    ///
    /// Collections dropped after the snapshot are still found. A collection
    /// created after it is not, even if it reuses a dropped name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unknown.
    fn collection(&self, database: &str, name: &str) -> StorageResult<Option<CollectionInfo>>;

    /// Opens a cursor over one collection, positioned before the first key.
    ///
    /// Collections dropped after the snapshot was taken are still readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection did not exist at the snapshot tick.
    fn cursor(&self, collection: CollectionId) -> StorageResult<Box<dyn SnapshotCursor>>;
}

/// A forward iterator over one collection of a snapshot, in key order.
pub trait SnapshotCursor: Send {
    /// Repositions the cursor before the smallest key.
    fn seek_to_first(&mut self);

    /// Repositions the cursor before the first key `>= key`.
    fn seek(&mut self, key: &str);

    /// Reads the next visible document and advances past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying snapshot became unreadable.
    fn next_entry(&mut self) -> StorageResult<Option<DocumentVersion>>;
}

/// Read access to the change log.
pub trait ChangeLog: Send + Sync {
    /// Tick of the most recent record (`Tick::ZERO` if nothing was written).
    fn latest_tick(&self) -> Tick;

    /// Highest tick removed by retention (`Tick::ZERO` if nothing was pruned).
    fn pruned_through(&self) -> Tick;

    /// Reads up to `max_records` retained records with tick `>= start`,
    /// in ascending tick order.
    fn read_from(&self, start: Tick, max_records: usize) -> Vec<LogRecord>;

    /// Returns how a logged transaction ended, if it is still retained.
    fn outcome(&self, txid: TransactionId) -> Option<TxOutcome>;
}
