//! # snapsync storage
//!
//! Storage-engine capability consumed by the replication core.
//!
//! The replication layer needs very little from an engine: point-in-time
//! snapshots, forward cursors bound to a snapshot, and a change log with
//! monotonically increasing ticks. Those capabilities are the traits in
//! this crate. [`InMemoryEngine`] implements them with MVCC versions kept
//! in memory.
//!
//! ## Design Principles
//!
//! - Document bodies are opaque bytes; the engine never interprets them
//! - Every write receives the next tick; a document's revision is its tick
//! - Transactions reach the change log only as complete batches
//! - Snapshots and cursors are released by dropping them
//!
//! ## Example
//!
//! ```rust
//! use snapsync_storage::{ChangeLog, CollectionKind, InMemoryEngine, StorageEngine};
//!
//! let engine = InMemoryEngine::new();
//! engine.create_database("app").unwrap();
//! let users = engine.create_collection("app", "users", CollectionKind::Document).unwrap();
//! engine.insert("app", "users", "alice", "{\"age\":30}").unwrap();
//!
//! let snapshot = engine.snapshot().unwrap();
//! let mut cursor = snapshot.cursor(users.id).unwrap();
//! let doc = cursor.next_entry().unwrap().unwrap();
//! assert_eq!(doc.key, "alice");
//! assert_eq!(engine.log().latest_tick(), doc.rev);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod engine;
mod error;
mod log;
mod memory;
mod transaction;
mod types;

pub use engine::{ChangeLog, EngineSnapshot, SnapshotCursor, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use log::{LogRecord, LogRecordKind, TxOutcome, WriteAheadLog};
pub use memory::InMemoryEngine;
pub use transaction::WriteTransaction;
pub use types::{
    is_system_name, CollectionId, CollectionInfo, CollectionKind, DocumentVersion, Tick,
    TransactionId,
};
