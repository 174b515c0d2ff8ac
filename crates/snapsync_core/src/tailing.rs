//! Change-log tailing.
//!
//! Turns the write-ahead log into a bounded, resumable stream of committed
//! changes. Tailing needs no session: the log is append-only, and a
//! follower resumes from `last_included + 1`.
//!
//! ## Window
//!
//! ```text
//!   from ≤ tick ≤ to      inclusive on both ends
//!   stop when: tick > to | byte budget reached | log exhausted
//! ```
//!
//! Aborted transaction fragments are skipped. `Begin`/`Commit` markers are
//! emitted only when no collection filter is set.

use crate::error::{ReplicationError, ReplicationResult};
use snapsync_protocol::{
    encoded_len, LogMarker, MarkerType, OpenTransactionsResponse, TailHeaders, TailResponse,
};
use snapsync_storage::{
    is_system_name, ChangeLog, CollectionId, LogRecord, LogRecordKind, StorageEngine, Tick,
    TxOutcome,
};

/// Parameters of one tail call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailWindow {
    /// Database whose records are emitted.
    pub database: String,
    /// First tick (inclusive).
    pub from: Tick,
    /// Last tick (inclusive).
    pub to: Tick,
    /// Stop once this many encoded bytes were produced.
    pub byte_budget: usize,
    /// Emit records of system collections.
    pub include_system: bool,
    /// Restrict to one collection.
    pub collection: Option<CollectionId>,
}

impl TailWindow {
    /// The whole log of `database` with no budget.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            from: Tick::ZERO,
            to: Tick::MAX,
            byte_budget: usize::MAX,
            include_system: true,
            collection: None,
        }
    }

    /// Sets the inclusive tick range.
    pub fn with_range(mut self, from: Tick, to: Tick) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Sets the byte budget.
    pub fn with_byte_budget(mut self, budget: usize) -> Self {
        self.byte_budget = budget;
        self
    }

    /// Sets whether system collections are included.
    pub fn with_include_system(mut self, include: bool) -> Self {
        self.include_system = include;
        self
    }

    /// Restricts the window to one collection.
    pub fn with_collection(mut self, collection: CollectionId) -> Self {
        self.collection = Some(collection);
        self
    }
}

/// Result of one tail call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailBatch {
    /// Emitted markers, ascending by tick.
    pub markers: Vec<LogMarker>,
    /// Tick of the last emitted marker, `Tick::ZERO` if none.
    pub last_included: Tick,
    /// Highest tick examined, including filtered records.
    pub last_scanned: Tick,
    /// Latest tick of the log at call time.
    pub latest: Tick,
    /// The log holds records past `last_scanned`.
    pub check_more: bool,
    /// The window starts inside retained history.
    pub from_present: bool,
}

impl TailBatch {
    /// Wire headers of the batch.
    #[must_use]
    pub fn headers(&self) -> TailHeaders {
        TailHeaders {
            check_more: self.check_more,
            last_included: self.last_included.as_u64(),
            last_scanned: self.last_scanned.as_u64(),
            last_tick: self.latest.as_u64(),
            from_present: self.from_present,
            active: true,
        }
    }

    /// Converts into the wire response.
    #[must_use]
    pub fn into_response(self) -> TailResponse {
        TailResponse {
            headers: self.headers(),
            markers: self.markers,
        }
    }
}

/// Extracts committed log entries for followers.
pub struct LogTailer<'a> {
    engine: &'a dyn StorageEngine,
    read_batch: usize,
}

impl<'a> LogTailer<'a> {
    /// Creates a tailer reading `read_batch` records per log access.
    pub fn new(engine: &'a dyn StorageEngine, read_batch: usize) -> Self {
        Self {
            engine,
            read_batch: read_batch.max(1),
        }
    }

    /// Reads one window of the log.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `from > to`.
    pub fn tail(&self, window: &TailWindow) -> ReplicationResult<TailBatch> {
        if window.from > window.to {
            return Err(ReplicationError::invalid_argument(format!(
                "invalid tick range {}..={}",
                window.from, window.to
            )));
        }
        let log = self.engine.log();
        let latest = log.latest_tick();
        let pruned = log.pruned_through();
        let from_present = window.from.max(Tick::new(1)) > pruned;

        let mut markers = Vec::new();
        let mut bytes = 0usize;
        let mut last_included = Tick::ZERO;
        let mut last_scanned = Tick::ZERO;
        let mut next = window.from;

        'scan: loop {
            let records = log.read_from(next, self.read_batch);
            let Some(last) = records.last() else {
                break;
            };
            next = last.tick.next();
            for record in &records {
                if record.tick > window.to {
                    break 'scan;
                }
                last_scanned = record.tick;
                let Some(marker) = self.marker_for(log, window, record) else {
                    continue;
                };
                bytes += encoded_len(&marker)?;
                last_included = record.tick;
                markers.push(marker);
                if bytes >= window.byte_budget {
                    break 'scan;
                }
            }
            if records.len() < self.read_batch || next > window.to {
                break;
            }
        }

        let check_more = !last_scanned.is_zero() && last_scanned < latest;
        tracing::debug!(
            database = %window.database,
            from = %window.from,
            to = %window.to,
            emitted = markers.len(),
            %last_included,
            %last_scanned,
            %latest,
            check_more,
            from_present,
            "log tailed"
        );
        Ok(TailBatch {
            markers,
            last_included,
            last_scanned,
            latest,
            check_more,
            from_present,
        })
    }

    /// Transactions open at a tick. This engine logs transactions only as
    /// complete batches, so the answer is always empty.
    #[must_use]
    pub fn open_transactions(&self) -> OpenTransactionsResponse {
        OpenTransactionsResponse {
            headers: TailHeaders {
                check_more: false,
                last_included: 0,
                last_scanned: 0,
                last_tick: 0,
                from_present: true,
                active: true,
            },
            transactions: Vec::new(),
        }
    }

    fn marker_for(
        &self,
        log: &dyn ChangeLog,
        window: &TailWindow,
        record: &LogRecord,
    ) -> Option<LogMarker> {
        if record.database != window.database {
            return None;
        }
        if let Some(txid) = record.txid {
            if log.outcome(txid) != Some(TxOutcome::Committed) {
                return None;
            }
        }

        let mut marker = LogMarker {
            tick: record.tick.as_u64(),
            marker_type: MarkerType::Insert,
            database: record.database.clone(),
            tid: record.txid.map(|t| t.as_u64()),
            cid: None,
            cname: None,
            key: None,
            rev: None,
            data: None,
        };

        let collection = match &record.kind {
            LogRecordKind::Begin | LogRecordKind::Commit => {
                if window.collection.is_some() {
                    return None;
                }
                marker.marker_type = if record.kind == LogRecordKind::Begin {
                    MarkerType::BeginTransaction
                } else {
                    MarkerType::CommitTransaction
                };
                return Some(marker);
            }
            LogRecordKind::Abort => return None,
            LogRecordKind::Insert {
                collection,
                key,
                body,
            } => {
                marker.key = Some(key.clone());
                marker.rev = Some(record.tick.as_u64());
                marker.data = Some(body.clone());
                *collection
            }
            LogRecordKind::Remove { collection, key } => {
                marker.marker_type = MarkerType::Remove;
                marker.key = Some(key.clone());
                marker.rev = Some(record.tick.as_u64());
                *collection
            }
            LogRecordKind::CreateCollection { info } => {
                marker.marker_type = MarkerType::CreateCollection;
                info.id
            }
            LogRecordKind::DropCollection { collection, .. } => {
                marker.marker_type = MarkerType::DropCollection;
                *collection
            }
        };

        if window.collection.is_some_and(|wanted| wanted != collection) {
            return None;
        }
        let name = self.collection_name(record, collection);
        if !window.include_system && name.as_deref().is_some_and(is_system_name) {
            return None;
        }
        marker.cid = Some(collection.as_u64());
        marker.cname = name;
        Some(marker)
    }

    fn collection_name(&self, record: &LogRecord, collection: CollectionId) -> Option<String> {
        match &record.kind {
            LogRecordKind::CreateCollection { info } => Some(info.name.clone()),
            LogRecordKind::DropCollection { name, .. } => Some(name.clone()),
            _ => self.engine.collection_by_id(collection).map(|info| info.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsync_storage::{CollectionKind, InMemoryEngine};

    fn engine_with(n: usize) -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine.create_database("db").unwrap();
        engine
            .create_collection("db", "c", CollectionKind::Document)
            .unwrap();
        for i in 0..n {
            engine.insert("db", "c", &format!("k{i}"), "v").unwrap();
        }
        engine
    }

    fn ticks(batch: &TailBatch) -> Vec<u64> {
        batch.markers.iter().map(|m| m.tick).collect()
    }

    #[test]
    fn inclusive_window_and_more_flag() {
        // collection creation is tick 1, inserts are 2..=10
        let engine = engine_with(9);
        let tailer = LogTailer::new(&engine, 4);

        let batch = tailer
            .tail(&TailWindow::new("db").with_range(Tick::new(1), Tick::new(5)))
            .unwrap();
        assert_eq!(ticks(&batch), vec![1, 2, 3, 4, 5]);
        assert_eq!(batch.last_included, Tick::new(5));
        assert!(batch.check_more);

        let batch = tailer
            .tail(&TailWindow::new("db").with_range(Tick::new(1), Tick::new(100)))
            .unwrap();
        assert_eq!(batch.markers.len(), 10);
        assert_eq!(batch.last_included, Tick::new(10));
        assert_eq!(batch.latest, Tick::new(10));
        assert!(!batch.check_more);
    }

    #[test]
    fn empty_window() {
        let engine = engine_with(3);
        let tailer = LogTailer::new(&engine, 16);
        let batch = tailer
            .tail(&TailWindow::new("db").with_range(Tick::new(50), Tick::new(60)))
            .unwrap();
        assert!(batch.markers.is_empty());
        assert_eq!(batch.last_included, Tick::ZERO);
        assert!(!batch.check_more);
    }

    #[test]
    fn invalid_range() {
        let engine = engine_with(0);
        let tailer = LogTailer::new(&engine, 16);
        let err = tailer
            .tail(&TailWindow::new("db").with_range(Tick::new(5), Tick::new(2)))
            .unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidArgument(_)));
    }

    #[test]
    fn byte_budget_truncates_and_signals_more() {
        let engine = engine_with(9);
        let tailer = LogTailer::new(&engine, 16);
        let batch = tailer.tail(&TailWindow::new("db").with_byte_budget(1)).unwrap();
        assert_eq!(ticks(&batch), vec![1]);
        assert!(batch.check_more);
    }

    #[test]
    fn aborted_fragments_are_skipped() {
        let engine = engine_with(0);
        let mut txn = engine.begin("db").unwrap();
        txn.put("c", "a", "1").unwrap();
        txn.abort().unwrap();
        let mut txn = engine.begin("db").unwrap();
        txn.put("c", "b", "1").unwrap();
        let txid = txn.id();
        txn.commit().unwrap();

        let tailer = LogTailer::new(&engine, 16);
        let batch = tailer.tail(&TailWindow::new("db")).unwrap();
        let types: Vec<MarkerType> = batch.markers.iter().map(|m| m.marker_type).collect();
        assert_eq!(
            types,
            vec![
                MarkerType::CreateCollection,
                MarkerType::BeginTransaction,
                MarkerType::Insert,
                MarkerType::CommitTransaction,
            ]
        );
        assert!(batch.markers[1..].iter().all(|m| m.tid == Some(txid.as_u64())));
        assert!(batch.markers.iter().all(|m| m.key.as_deref() != Some("a")));
    }

    #[test]
    fn collection_filter_drops_transaction_markers() {
        let engine = engine_with(0);
        let other = engine
            .create_collection("db", "other", CollectionKind::Document)
            .unwrap();
        let mut txn = engine.begin("db").unwrap();
        txn.put("c", "a", "1").unwrap();
        txn.put("other", "b", "1").unwrap();
        txn.commit().unwrap();

        let tailer = LogTailer::new(&engine, 16);
        let batch = tailer
            .tail(&TailWindow::new("db").with_collection(other.id))
            .unwrap();
        let keys: Vec<Option<&str>> = batch.markers.iter().map(|m| m.key.as_deref()).collect();
        assert_eq!(keys, vec![None, Some("b")]);
        assert_eq!(batch.markers[0].marker_type, MarkerType::CreateCollection);
    }

    #[test]
    fn system_collections_can_be_excluded() {
        let engine = engine_with(1);
        engine
            .create_collection("db", "_system", CollectionKind::Document)
            .unwrap();
        engine.insert("db", "_system", "s", "x").unwrap();

        let tailer = LogTailer::new(&engine, 16);
        let all = tailer.tail(&TailWindow::new("db")).unwrap();
        assert_eq!(all.markers.len(), 4);
        let user = tailer
            .tail(&TailWindow::new("db").with_include_system(false))
            .unwrap();
        assert_eq!(user.markers.len(), 2);
        // filtered records still count as scanned
        assert_eq!(user.last_scanned, Tick::new(4));
        assert_eq!(user.last_included, Tick::new(2));
        assert!(!user.check_more);
    }

    #[test]
    fn from_present_tracks_pruning() {
        let engine = engine_with(9);
        let tailer = LogTailer::new(&engine, 16);
        assert!(tailer.tail(&TailWindow::new("db")).unwrap().from_present);

        engine.prune_log_through(Tick::new(4));
        let gap = tailer
            .tail(&TailWindow::new("db").with_range(Tick::new(3), Tick::MAX))
            .unwrap();
        assert!(!gap.from_present);
        assert_eq!(gap.markers.first().map(|m| m.tick), Some(5));

        let present = tailer
            .tail(&TailWindow::new("db").with_range(Tick::new(5), Tick::MAX))
            .unwrap();
        assert!(present.from_present);
    }

    #[test]
    fn open_transactions_is_always_empty() {
        let engine = engine_with(3);
        let response = LogTailer::new(&engine, 16).open_transactions();
        assert!(response.transactions.is_empty());
        assert_eq!(response.headers.last_tick, 0);
        assert!(response.headers.from_present);
    }
}
