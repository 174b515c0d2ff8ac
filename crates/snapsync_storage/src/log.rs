//! Write-ahead change log.
//!
//! Every write to the engine is recorded here before it becomes visible.
//! Records carry consecutive ticks. Transactions are appended as one
//! contiguous batch at their end:
//!
//! ```text
//! | Begin | op | op | ... | Commit |     committed transaction
//! | Begin | op | ... | Abort |          aborted fragment (must be skipped)
//! | op |                                standalone write
//! ```
//!
//! ## Invariants
//!
//! - Ticks are strictly increasing with no holes between retained records
//! - A transaction's terminal record is appended together with its operations,
//!   so readers never observe an unfinished transaction
//! - Pruning only removes a prefix; `pruned_through` only grows

use crate::engine::ChangeLog;
use crate::types::{CollectionId, CollectionInfo, Tick, TransactionId};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// All operations became visible.
    Committed,
    /// All operations were discarded.
    Aborted,
}

/// The payload of a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecordKind {
    /// Start of a transaction batch.
    Begin,
    /// Successful end of a transaction batch.
    Commit,
    /// Unsuccessful end of a transaction batch.
    Abort,
    /// Insert or replace a document. The record tick becomes its revision.
    Insert {
        /// Target collection.
        collection: CollectionId,
        /// Document key.
        key: String,
        /// Encoded document body.
        body: Bytes,
    },
    /// Remove a document.
    Remove {
        /// Target collection.
        collection: CollectionId,
        /// Document key.
        key: String,
    },
    /// A collection was created.
    CreateCollection {
        /// Metadata of the new collection.
        info: CollectionInfo,
    },
    /// A collection was dropped.
    DropCollection {
        /// Dropped collection.
        collection: CollectionId,
        /// Its name at the time of the drop.
        name: String,
    },
}

/// A single record of the change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Tick assigned to this record.
    pub tick: Tick,
    /// Database the record belongs to.
    pub database: String,
    /// Owning transaction, `None` for standalone writes.
    pub txid: Option<TransactionId>,
    /// Record payload.
    pub kind: LogRecordKind,
}

#[derive(Debug, Default)]
struct LogState {
    records: VecDeque<LogRecord>,
    last_tick: Tick,
    pruned_through: Tick,
    /// Outcome and terminal tick of each logged transaction.
    outcomes: HashMap<TransactionId, (TxOutcome, Tick)>,
}

/// In-memory write-ahead change log.
#[derive(Debug, Default)]
pub struct WriteAheadLog {
    state: RwLock<LogState>,
}

impl WriteAheadLog {
    /// Creates an empty log. The first record receives tick 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a standalone record and returns its tick.
    pub fn append(&self, database: &str, kind: LogRecordKind) -> Tick {
        self.append_with(database, |_| kind)
    }

    /// Appends a standalone record built from the tick it will receive.
    pub fn append_with(&self, database: &str, build: impl FnOnce(Tick) -> LogRecordKind) -> Tick {
        let mut state = self.state.write();
        let tick = state.last_tick.next();
        state.last_tick = tick;
        state.records.push_back(LogRecord {
            tick,
            database: database.to_string(),
            txid: None,
            kind: build(tick),
        });
        tick
    }

    /// Appends a whole transaction batch: `Begin`, the operations, and the
    /// terminal record for `outcome`.
    ///
    /// Returns the ticks assigned to the operations, in order.
    pub fn append_transaction(
        &self,
        database: &str,
        txid: TransactionId,
        ops: Vec<LogRecordKind>,
        outcome: TxOutcome,
    ) -> Vec<Tick> {
        let mut state = self.state.write();
        let mut op_ticks = Vec::with_capacity(ops.len());

        let begin = state.last_tick.next();
        state.records.push_back(LogRecord {
            tick: begin,
            database: database.to_string(),
            txid: Some(txid),
            kind: LogRecordKind::Begin,
        });
        state.last_tick = begin;

        for kind in ops {
            let tick = state.last_tick.next();
            state.records.push_back(LogRecord {
                tick,
                database: database.to_string(),
                txid: Some(txid),
                kind,
            });
            state.last_tick = tick;
            op_ticks.push(tick);
        }

        let end = state.last_tick.next();
        let terminal = match outcome {
            TxOutcome::Committed => LogRecordKind::Commit,
            TxOutcome::Aborted => LogRecordKind::Abort,
        };
        state.records.push_back(LogRecord {
            tick: end,
            database: database.to_string(),
            txid: Some(txid),
            kind: terminal,
        });
        state.last_tick = end;
        state.outcomes.insert(txid, (outcome, end));

        op_ticks
    }

    /// Drops every record with a tick `<= tick`.
    ///
    /// Returns the number of records removed.
    pub fn prune_through(&self, tick: Tick) -> usize {
        let mut state = self.state.write();
        let mut removed = 0;
        while state.records.front().is_some_and(|r| r.tick <= tick) {
            state.records.pop_front();
            removed += 1;
        }
        let bound = tick.min(state.last_tick);
        if bound > state.pruned_through {
            state.pruned_through = bound;
        }
        let pruned = state.pruned_through;
        state.outcomes.retain(|_, (_, end)| *end > pruned);
        removed
    }

    /// Returns the number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns true if no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

impl ChangeLog for WriteAheadLog {
    fn latest_tick(&self) -> Tick {
        self.state.read().last_tick
    }

    fn pruned_through(&self) -> Tick {
        self.state.read().pruned_through
    }

    fn read_from(&self, start: Tick, max_records: usize) -> Vec<LogRecord> {
        let state = self.state.read();
        let first = state.records.partition_point(|r| r.tick < start);
        state
            .records
            .range(first..)
            .take(max_records)
            .cloned()
            .collect()
    }

    fn outcome(&self, txid: TransactionId) -> Option<TxOutcome> {
        self.state.read().outcomes.get(&txid).map(|(o, _)| *o)
    }
}
