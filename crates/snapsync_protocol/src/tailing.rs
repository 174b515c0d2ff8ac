//! Log-tailing messages.
//!
//! A tail response is an ordered list of [`LogMarker`]s plus the
//! [`TailHeaders`] that tell the follower where to continue.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of a change-log marker. The numeric codes are stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerType {
    /// Collection created.
    CreateCollection,
    /// Collection dropped.
    DropCollection,
    /// Transaction start.
    BeginTransaction,
    /// Transaction commit.
    CommitTransaction,
    /// Document inserted or replaced.
    Insert,
    /// Document removed.
    Remove,
}

impl MarkerType {
    /// Returns the numeric wire code.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::CreateCollection => 2000,
            Self::DropCollection => 2001,
            Self::BeginTransaction => 2200,
            Self::CommitTransaction => 2201,
            Self::Insert => 2300,
            Self::Remove => 2302,
        }
    }
}

/// One change-log entry as shipped to a follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMarker {
    /// Tick of the record.
    pub tick: u64,
    /// Marker kind.
    #[serde(rename = "type")]
    pub marker_type: MarkerType,
    /// Database of the record.
    pub database: String,
    /// Transaction id, absent for standalone writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<u64>,
    /// Collection id for document and collection markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<u64>,
    /// Collection name for document and collection markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Document key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Document revision (equal to `tick` for inserts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<u64>,
    /// Document body for inserts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

/// Request for a slice of the change log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailRequest {
    /// Database to tail.
    pub database: String,
    /// First tick (inclusive). Defaults to 0.
    #[serde(default)]
    pub from: Option<u64>,
    /// Last tick (inclusive). Defaults to the end of the log.
    #[serde(default)]
    pub to: Option<u64>,
    /// Byte budget of the response.
    #[serde(default)]
    pub chunk_size: Option<u64>,
    /// Include system collections. Defaults to true.
    #[serde(default)]
    pub include_system: Option<bool>,
    /// Restrict to one collection.
    #[serde(default)]
    pub collection: Option<String>,
    /// Follower identity for progress tracking.
    #[serde(default)]
    pub server_id: Option<String>,
}

/// Continuation metadata of a tail or open-transactions response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailHeaders {
    /// More log data exists beyond what was returned.
    pub check_more: bool,
    /// Highest tick emitted, 0 if nothing was emitted.
    pub last_included: u64,
    /// Highest tick examined, including filtered records.
    pub last_scanned: u64,
    /// Latest tick of the log at call time.
    pub last_tick: u64,
    /// The requested start lies within retained history.
    pub from_present: bool,
    /// Always true; the log is always being written.
    pub active: bool,
}

/// Response to [`TailRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailResponse {
    /// Continuation metadata.
    pub headers: TailHeaders,
    /// Markers in ascending tick order.
    pub markers: Vec<LogMarker>,
}

impl TailResponse {
    /// Returns true if no markers were emitted (HTTP 204 in the classic surface).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Response to the open-transactions query. Always empty for this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTransactionsResponse {
    /// Continuation metadata (`lastTick = 0`, `fromPresent = true`).
    pub headers: TailHeaders,
    /// Transactions open at the requested tick.
    pub transactions: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_codes() {
        assert_eq!(MarkerType::Insert.code(), 2300);
        assert_eq!(MarkerType::Remove.code(), 2302);
        assert_eq!(MarkerType::BeginTransaction.code(), 2200);
        assert_eq!(MarkerType::CommitTransaction.code(), 2201);
    }

    #[test]
    fn marker_omits_absent_fields() {
        let marker = LogMarker {
            tick: 7,
            marker_type: MarkerType::CommitTransaction,
            database: "db".into(),
            tid: Some(3),
            cid: None,
            cname: None,
            key: None,
            rev: None,
            data: None,
        };
        let json = serde_json::to_value(&marker).unwrap();
        assert_eq!(json["type"], "commit-transaction");
        assert!(json.get("key").is_none());
        assert_eq!(json["tid"], 3);
    }
}
