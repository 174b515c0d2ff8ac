//! Buffered write transactions.

use crate::error::{StorageError, StorageResult};
use crate::log::{LogRecordKind, TxOutcome};
use crate::memory::InMemoryEngine;
use crate::types::{CollectionId, Tick, TransactionId};
use bytes::Bytes;

/// A buffered operation of a write transaction.
#[derive(Debug, Clone)]
pub(crate) enum PendingOp {
    /// Insert or replace a document.
    Put {
        collection: CollectionId,
        key: String,
        body: Bytes,
    },
    /// Remove a document.
    Remove { collection: CollectionId, key: String },
}

impl PendingOp {
    pub(crate) fn collection(&self) -> CollectionId {
        match self {
            Self::Put { collection, .. } | Self::Remove { collection, .. } => *collection,
        }
    }

    pub(crate) fn to_record(&self) -> LogRecordKind {
        match self {
            Self::Put {
                collection,
                key,
                body,
            } => LogRecordKind::Insert {
                collection: *collection,
                key: key.clone(),
                body: body.clone(),
            },
            Self::Remove { collection, key } => LogRecordKind::Remove {
                collection: *collection,
                key: key.clone(),
            },
        }
    }
}

/// A write transaction on one database.
///
/// Operations are buffered and become visible all at once on [`commit`].
/// Nothing reaches the change log before the transaction finishes; the log
/// then receives the whole `Begin .. Commit` (or `Begin .. Abort`) batch.
///
/// Dropping an unfinished transaction aborts it.
///
/// [`commit`]: WriteTransaction::commit
#[derive(Debug)]
pub struct WriteTransaction<'a> {
    engine: &'a InMemoryEngine,
    database: String,
    txid: TransactionId,
    ops: Vec<PendingOp>,
    finished: bool,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(engine: &'a InMemoryEngine, database: String, txid: TransactionId) -> Self {
        Self {
            engine,
            database,
            txid,
            ops: Vec::new(),
            finished: false,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.txid
    }

    /// Returns the number of buffered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing was buffered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Buffers an insert or replace.
    ///
    /// # Errors
    ///
    /// Fails if the collection is unknown.
    pub fn put(&mut self, collection: &str, key: &str, body: impl Into<Bytes>) -> StorageResult<()> {
        let collection = self.engine.resolve_collection(&self.database, collection)?;
        self.ops.push(PendingOp::Put {
            collection,
            key: key.to_string(),
            body: body.into(),
        });
        Ok(())
    }

    /// Buffers a removal.
    ///
    /// # Errors
    ///
    /// Fails if the collection is unknown.
    pub fn remove(&mut self, collection: &str, key: &str) -> StorageResult<()> {
        let collection = self.engine.resolve_collection(&self.database, collection)?;
        self.ops.push(PendingOp::Remove {
            collection,
            key: key.to_string(),
        });
        Ok(())
    }

    /// Commits the transaction.
    ///
    /// Returns the tick of the last operation, or `None` for an empty
    /// transaction (which logs nothing).
    ///
    /// # Errors
    ///
    /// Fails if a target collection was dropped in the meantime; the
    /// operations are then logged as an aborted fragment.
    pub fn commit(mut self) -> StorageResult<Option<Tick>> {
        self.finish(TxOutcome::Committed)
    }

    /// Aborts the transaction, logging the discarded operations.
    ///
    /// # Errors
    ///
    /// Propagates failures of the engine.
    pub fn abort(mut self) -> StorageResult<()> {
        self.finish(TxOutcome::Aborted).map(|_| ())
    }

    fn finish(&mut self, outcome: TxOutcome) -> StorageResult<Option<Tick>> {
        if self.finished {
            return Err(StorageError::TransactionFinished(self.txid));
        }
        self.finished = true;
        let ops = std::mem::take(&mut self.ops);
        self.engine
            .finish_transaction(&self.database, self.txid, ops, outcome)
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.finish(TxOutcome::Aborted) {
                tracing::warn!(txid = %self.txid, error = %err, "implicit abort failed");
            }
        }
    }
}
