//! Session, inventory, dump and barrier messages.

use crate::chunks::DocumentEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to open a replication session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Database whose snapshot is served.
    pub database: String,
    /// Session time-to-live in seconds.
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Follower identity for progress tracking.
    #[serde(default)]
    pub server_id: Option<String>,
}

/// Answer to [`CreateSessionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    /// New session id.
    pub id: u64,
    /// Latest log tick when the snapshot was taken.
    pub last_tick: u64,
}

/// Request to extend a session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewSessionRequest {
    /// Session id.
    pub id: u64,
    /// New time-to-live in seconds.
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Follower identity for progress tracking.
    #[serde(default)]
    pub server_id: Option<String>,
}

/// Request for the collection inventory of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRequest {
    /// Session id.
    pub session_id: u64,
    /// Include system collections. Defaults to true.
    #[serde(default)]
    pub include_system: Option<bool>,
    /// List every database instead of the session's.
    #[serde(default)]
    pub global: Option<bool>,
}

/// Catalog entry of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDescriptor {
    /// Collection id.
    pub id: u64,
    /// Collection name.
    pub name: String,
    /// `"document"` or `"edge"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Name starts with `_`.
    pub is_system: bool,
    /// Tick of the creation record.
    pub created_tick: u64,
}

/// Collections of one database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseInventory {
    /// Collections ordered by id.
    pub collections: Vec<CollectionDescriptor>,
}

/// Replication state reported with an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationState {
    /// Always true.
    pub running: bool,
    /// Tick the session's snapshot was taken at.
    pub last_log_tick: u64,
    /// Same as `last_log_tick`; the log holds no uncommitted entries.
    pub last_uncommitted_log_tick: u64,
    /// Number of logged events up to `last_log_tick`.
    pub total_events: u64,
    /// Server time in RFC 3339.
    pub time: String,
}

/// Inventory response. Exactly one of `collections` / `databases` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResponse {
    /// Collections of the session's database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<CollectionDescriptor>>,
    /// Collections of every database, by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<BTreeMap<String, DatabaseInventory>>,
    /// Session tick state.
    pub state: ReplicationState,
    /// Latest log tick at call time.
    pub tick: u64,
}

/// Request for the next batch of a collection dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpRequest {
    /// Session id.
    pub session_id: u64,
    /// Collection name.
    pub collection: String,
    /// Byte budget of the batch.
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// One batch of a collection dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpResponse {
    /// The dump has more documents after this batch.
    pub check_more: bool,
    /// Snapshot tick if documents were returned, else 0.
    pub last_included: u64,
    /// Documents in key order.
    pub documents: Vec<DocumentEntry>,
}

/// Answer to a barrier creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierCreated {
    /// Barrier id.
    pub id: u64,
}
