//! # snapsync core
//!
//! Leader-side replication: lets a follower copy a collection from a
//! consistent snapshot across many round trips, then stay current by
//! tailing the change log.
//!
//! ## Components
//!
//! - [`SnapshotSession`]: one pinned engine snapshot plus per-collection cursors
//! - [`SessionRegistry`]: creates, lends out (one borrower at a time) and
//!   expires sessions; [`Reaper`] runs the expiry in the background
//! - [`KeyChunkProtocol`]: partitions a collection into fingerprinted key
//!   chunks and serves their keys or documents page by page
//! - [`LogTailer`]: extracts committed log entries in a tick window under a
//!   byte budget
//! - [`InventorySnapshotBuilder`]: catalog plus session tick state
//! - [`dump`]: resumable forward-only collection dump
//! - [`ReplicationClients`]: follower progress, used for log retention
//!
//! ## Example
//!
//! ```rust
//! use snapsync_core::{FetchMode, ChunkFetch, KeyChunkProtocol, ReplicationConfig, SessionRegistry};
//! use snapsync_storage::{CollectionKind, InMemoryEngine};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(InMemoryEngine::new());
//! engine.create_database("app").unwrap();
//! engine.create_collection("app", "users", CollectionKind::Document).unwrap();
//! engine.insert("app", "users", "alice", "{}").unwrap();
//!
//! let registry = SessionRegistry::new(engine.clone(), ReplicationConfig::default());
//! let created = registry.create("app", None).unwrap();
//!
//! let mut session = registry.checkout(created.id).unwrap();
//! let protocol = KeyChunkProtocol::new();
//! let chunks = protocol.list_chunks(&mut session, "users", 1000).unwrap();
//! assert_eq!(chunks.len(), 1);
//! let page = protocol
//!     .fetch_chunk(&mut session, &ChunkFetch::new("users", 0, 1000, FetchMode::Keys))
//!     .unwrap();
//! assert_eq!(page.entries.keys(), vec!["alice"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod chunks;
mod clients;
mod config;
mod dump;
mod error;
mod fingerprint;
mod inventory;
mod registry;
mod session;
mod tailing;

pub use chunks::{Chunk, ChunkFetch, KeyChunkProtocol};
pub use clients::{ClientProgress, ReplicationClients};
pub use config::ReplicationConfig;
pub use dump::dump;
pub use error::{ReplicationError, ReplicationResult};
pub use fingerprint::{fingerprint, ChunkHasher};
pub use inventory::InventorySnapshotBuilder;
pub use registry::{CreatedSession, Reaper, SessionGuard, SessionRegistry};
pub use session::{SessionId, SnapshotSession};
pub use tailing::{LogTailer, TailBatch, TailWindow};

pub use snapsync_protocol::FetchMode;
