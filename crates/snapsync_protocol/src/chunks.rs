//! Key-chunk synchronization messages.

use crate::error::ProtocolError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a chunk fetch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Keys with their revisions.
    Keys,
    /// Full documents.
    Docs,
}

impl FromStr for FetchMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keys" => Ok(Self::Keys),
            "docs" => Ok(Self::Docs),
            other => Err(ProtocolError::invalid_value("type", other)),
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keys => write!(f, "keys"),
            Self::Docs => write!(f, "docs"),
        }
    }
}

/// Request to bind a collection to a session for key synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindKeysRequest {
    /// Session id.
    pub session_id: u64,
    /// Collection name.
    pub collection: String,
}

/// Answer to [`BindKeysRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysBound {
    /// Session id the binding lives in.
    pub id: u64,
    /// Number of documents in the snapshot of the collection.
    pub count: u64,
}

/// Request for the chunk partition of a bound collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChunksRequest {
    /// Session id.
    pub session_id: u64,
    /// Collection name.
    pub collection: String,
    /// Target number of keys per chunk.
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// Summary of one chunk: a contiguous key range with a content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// Smallest key in the chunk.
    pub low: String,
    /// Largest key in the chunk (the boundary key).
    pub high: String,
    /// Number of keys in the chunk.
    pub count: u64,
    /// Hex-encoded SHA-256 over keys, revisions and bodies.
    pub hash: String,
}

/// Ordered chunk partition of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkList {
    /// Chunks in key order.
    pub chunks: Vec<ChunkSummary>,
}

/// Request for the contents of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchChunkRequest {
    /// Session id.
    pub session_id: u64,
    /// Collection name.
    pub collection: String,
    /// Index of the chunk in the listed partition.
    pub chunk: u64,
    /// Maximum number of entries per page.
    #[serde(default)]
    pub chunk_size: Option<u64>,
    /// Key to resume from (inclusive).
    #[serde(default)]
    pub low: Option<String>,
    /// `"keys"` or `"docs"`.
    #[serde(rename = "type")]
    pub fetch_type: String,
    /// Position inside the chunk. Its presence enables the page byte budget.
    #[serde(default)]
    pub offset: Option<u64>,
    /// Keys to fetch in docs mode; `None` fetches the whole chunk.
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

/// A key with its revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Document key.
    pub key: String,
    /// Document revision.
    pub rev: u64,
}

/// A full document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// Document key.
    pub key: String,
    /// Document revision.
    pub rev: u64,
    /// Encoded document body.
    pub body: Bytes,
}

/// Entries of a chunk page, shaped by the fetch mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entries", rename_all = "lowercase")]
pub enum ChunkEntries {
    /// Keys mode.
    Keys(Vec<KeyEntry>),
    /// Docs mode.
    Docs(Vec<DocumentEntry>),
}

impl ChunkEntries {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Keys(k) => k.len(),
            Self::Docs(d) => d.len(),
        }
    }

    /// Returns true if the page holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the entries, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Keys(k) => k.iter().map(|e| e.key.as_str()).collect(),
            Self::Docs(d) => d.iter().map(|e| e.key.as_str()).collect(),
        }
    }
}

/// One page of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPage {
    /// The entries.
    #[serde(flatten)]
    pub entries: ChunkEntries,
    /// True if the chunk holds more entries after this page.
    pub more_in_chunk: bool,
    /// Key to pass as `low` to continue the chunk.
    #[serde(default)]
    pub resume_key: Option<String>,
}

/// Acknowledgment of a key-binding removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveKeysAck {
    /// Session id, as a string.
    pub id: String,
    /// Always false.
    pub error: bool,
    /// Always 202.
    pub code: u16,
}

impl RemoveKeysAck {
    /// Builds the acknowledgment for a session id.
    #[must_use]
    pub fn accepted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: false,
            code: 202,
        }
    }
}
