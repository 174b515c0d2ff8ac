//! # snapsync protocol
//!
//! Wire types for leader-side replication.
//!
//! This crate provides:
//! - Session, inventory and dump messages
//! - Key-chunk messages (chunk summaries, key and document pages)
//! - Log-tailing markers and continuation headers
//! - CBOR encoding/decoding and encoded-size accounting
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod chunks;
mod codec;
mod error;
mod messages;
mod tailing;

pub use chunks::{
    BindKeysRequest, ChunkEntries, ChunkList, ChunkPage, ChunkSummary, DocumentEntry,
    FetchChunkRequest, FetchMode, KeyEntry, KeysBound, ListChunksRequest, RemoveKeysAck,
};
pub use codec::{decode_cbor, encode_cbor, encoded_len};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    BarrierCreated, CollectionDescriptor, CreateSessionRequest, DatabaseInventory, DumpRequest,
    DumpResponse, InventoryRequest, InventoryResponse, RenewSessionRequest, ReplicationState,
    SessionCreated,
};
pub use tailing::{
    LogMarker, MarkerType, OpenTransactionsResponse, TailHeaders, TailRequest, TailResponse,
};
