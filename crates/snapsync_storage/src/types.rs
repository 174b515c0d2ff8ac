//! Core type definitions for the storage layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical timestamp assigned to every logged write.
///
/// Ticks are monotonically increasing and never reused. `Tick::ZERO` means
/// "no tick" (nothing written yet, nothing included).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    /// The "no tick" value.
    pub const ZERO: Tick = Tick(0);

    /// The largest representable tick.
    pub const MAX: Tick = Tick(u64::MAX);

    /// Creates a tick from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns true if this is the "no tick" value.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a collection, unique across all databases of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub u64);

impl CollectionId {
    /// Creates a new collection ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Identifier of a write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Kind of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Plain document collection.
    Document,
    /// Edge collection (documents connecting other documents).
    Edge,
}

/// Catalog metadata of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Engine-wide collection identifier.
    pub id: CollectionId,
    /// Collection name (unique within its database).
    pub name: String,
    /// Name of the owning database.
    pub database: String,
    /// Collection kind.
    pub kind: CollectionKind,
    /// Tick of the record that created the collection.
    pub created_tick: Tick,
}

impl CollectionInfo {
    /// Returns true for internally reserved collections (names starting with `_`).
    #[must_use]
    pub fn is_system(&self) -> bool {
        is_system_name(&self.name)
    }
}

/// Returns true if a collection name denotes a system collection.
#[must_use]
pub fn is_system_name(name: &str) -> bool {
    name.starts_with('_')
}

/// One visible version of a document, as read through a snapshot cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersion {
    /// Primary key.
    pub key: String,
    /// Revision (tick of the write that produced this version).
    pub rev: Tick,
    /// Encoded document body. Opaque to the storage layer.
    pub body: Bytes,
}
