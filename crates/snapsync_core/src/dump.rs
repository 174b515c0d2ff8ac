//! Resumable collection dump over a session snapshot.

use crate::error::{ReplicationError, ReplicationResult};
use crate::session::{DumpCursor, SnapshotSession};
use snapsync_protocol::{encoded_len, DocumentEntry, DumpResponse};

/// Returns the next batch of `collection`'s documents.
///
/// Each collection keeps one forward-only dump cursor per session, so
/// repeated calls continue where the previous one stopped. A batch ends
/// after the entry that reaches `byte_budget`. The collection is resolved
/// at the snapshot tick, like [`KeyChunkProtocol::bind_collection`].
///
/// [`KeyChunkProtocol::bind_collection`]: crate::KeyChunkProtocol::bind_collection
///
/// # Errors
///
/// `NotFound` if the collection does not exist in the session's snapshot.
pub fn dump(
    session: &mut SnapshotSession,
    collection: &str,
    byte_budget: usize,
) -> ReplicationResult<DumpResponse> {
    if !session.dumps.contains_key(collection) {
        let info = session
            .snapshot()
            .collection(session.database(), collection)?
            .ok_or_else(|| ReplicationError::not_found(format!("collection {collection}")))?;
        let cursor = session.snapshot().cursor(info.id)?;
        session
            .dumps
            .insert(collection.to_string(), DumpCursor::new(cursor));
    }
    let snapshot_tick = session.last_tick();
    let id = session.id();
    let state = session
        .dumps
        .get_mut(collection)
        .ok_or_else(|| ReplicationError::not_found(format!("collection {collection}")))?;

    let mut documents = Vec::new();
    let mut bytes = 0usize;
    while let Some(entry) = state.next()? {
        let doc = DocumentEntry {
            key: entry.key,
            rev: entry.rev.as_u64(),
            body: entry.body,
        };
        bytes += encoded_len(&doc)?;
        documents.push(doc);
        if bytes >= byte_budget {
            break;
        }
    }
    let check_more = state.peek()?;
    let last_included = if documents.is_empty() {
        0
    } else {
        snapshot_tick.as_u64()
    };

    tracing::debug!(
        session = %id,
        collection,
        documents = documents.len(),
        bytes,
        check_more,
        "dump batch"
    );
    Ok(DumpResponse {
        check_more,
        last_included,
        documents,
    })
}
