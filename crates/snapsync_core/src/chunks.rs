//! Ordered-key chunking over a session snapshot.
//!
//! A follower synchronizes a collection in three steps:
//!
//! 1. `bind_collection` opens a cursor on the session's snapshot
//! 2. `list_chunks` partitions the key space into chunks of at most
//!    `chunk_size` keys, each with a content fingerprint
//! 3. `fetch_chunk` serves keys or documents of chunks whose fingerprint
//!    differs from the follower's, one page at a time
//!
//! Chunks are contiguous, disjoint and cover every key of the snapshot
//! exactly once, in ascending key order.

use crate::error::{ReplicationError, ReplicationResult};
use crate::fingerprint::ChunkHasher;
use crate::session::{KeyBinding, SnapshotSession};
use snapsync_protocol::{
    encoded_len, ChunkEntries, ChunkPage, ChunkSummary, DocumentEntry, FetchMode, KeyEntry,
};
use snapsync_storage::DocumentVersion;
use std::collections::BTreeSet;

/// One contiguous key range of a bound collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Smallest key in the chunk.
    pub low: String,
    /// Largest key in the chunk.
    pub high: String,
    /// Number of keys in the chunk.
    pub count: u64,
    /// Hex SHA-256 fingerprint of the chunk's entries.
    pub hash: String,
}

impl From<Chunk> for ChunkSummary {
    fn from(chunk: Chunk) -> Self {
        Self {
            low: chunk.low,
            high: chunk.high,
            count: chunk.count,
            hash: chunk.hash,
        }
    }
}

/// Parameters of a chunk fetch.
#[derive(Debug, Clone)]
pub struct ChunkFetch {
    /// Collection name.
    pub collection: String,
    /// Index into the listed partition.
    pub index: usize,
    /// Maximum number of entries per page.
    pub page_size: usize,
    /// Key to resume from; clamped to the chunk's low key when outside it.
    pub resume_low: Option<String>,
    /// Keys or documents.
    pub mode: FetchMode,
    /// Stop once this many encoded bytes were produced.
    pub byte_budget: usize,
    /// In docs mode, restrict output to these keys.
    pub keys: Option<BTreeSet<String>>,
}

impl ChunkFetch {
    /// Fetch of a whole chunk with no byte budget.
    pub fn new(collection: impl Into<String>, index: usize, page_size: usize, mode: FetchMode) -> Self {
        Self {
            collection: collection.into(),
            index,
            page_size,
            resume_low: None,
            mode,
            byte_budget: usize::MAX,
            keys: None,
        }
    }

    /// Sets the resume key.
    pub fn with_resume_low(mut self, key: impl Into<String>) -> Self {
        self.resume_low = Some(key.into());
        self
    }

    /// Sets the byte budget.
    pub fn with_byte_budget(mut self, budget: usize) -> Self {
        self.byte_budget = budget;
        self
    }

    /// Restricts a docs fetch to a key set.
    pub fn with_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.keys = Some(keys.into_iter().collect());
        self
    }
}

/// Key-chunk protocol over snapshot sessions.
///
/// Collections are always resolved against the session's snapshot, never
/// against the live catalog.
#[derive(Debug, Clone, Copy)]
pub struct KeyChunkProtocol {
    min_chunk_size: usize,
}

impl Default for KeyChunkProtocol {
    fn default() -> Self {
        Self { min_chunk_size: 1 }
    }
}

impl KeyChunkProtocol {
    /// Creates the protocol with a minimum chunk size of one key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the smallest chunk and page size the protocol will use.
    #[must_use]
    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size.max(1);
        self
    }

    /// Binds `collection` to the session and returns its key count in the
    /// snapshot.
    ///
    /// The name is resolved at the snapshot tick, so a collection dropped
    /// (or dropped and recreated) since then still binds to the contents
    /// the snapshot saw. Binding again replaces the cursor but keeps an
    /// already listed partition, so chunk indexes stay stable.
    ///
    /// # Errors
    ///
    /// `NotFound` if the collection does not exist in the session's snapshot.
    pub fn bind_collection(
        &self,
        session: &mut SnapshotSession,
        collection: &str,
    ) -> ReplicationResult<u64> {
        let info = session
            .snapshot()
            .collection(session.database(), collection)?
            .ok_or_else(|| {
                ReplicationError::not_found(format!(
                    "collection {}/{collection} at tick {}",
                    session.database(),
                    session.last_tick()
                ))
            })?;

        let mut cursor = session.snapshot().cursor(info.id)?;
        let mut count = 0u64;
        while cursor.next_entry()?.is_some() {
            count += 1;
        }
        cursor.seek_to_first();

        let previous = session.bindings.remove(collection);
        let rebound = previous.is_some();
        let chunks = previous.and_then(|binding| binding.chunks);
        session.bindings.insert(
            collection.to_string(),
            KeyBinding {
                info,
                cursor,
                chunks,
            },
        );
        tracing::debug!(
            session = %session.id(),
            collection,
            count,
            rebound,
            "collection bound"
        );
        Ok(count)
    }

    /// Partitions the bound collection into chunks of at most `chunk_size`
    /// keys. Binds the collection first if needed.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown collections, `Engine`/`SnapshotInvalid` on
    /// read failures.
    pub fn list_chunks(
        &self,
        session: &mut SnapshotSession,
        collection: &str,
        chunk_size: usize,
    ) -> ReplicationResult<Vec<Chunk>> {
        if !session.bindings.contains_key(collection) {
            self.bind_collection(session, collection)?;
        }
        let id = session.id();
        let binding = binding_mut(session, collection)?;
        let chunk_size = chunk_size.max(self.min_chunk_size);

        let mut chunks = Vec::new();
        let mut current: Option<(String, String, ChunkHasher)> = None;
        binding.cursor.seek_to_first();
        while let Some(entry) = binding.cursor.next_entry()? {
            let (_, high, hasher) = current.get_or_insert_with(|| {
                (entry.key.clone(), String::new(), ChunkHasher::new())
            });
            hasher.update(&entry);
            high.clone_from(&entry.key);
            if hasher.entries() as usize >= chunk_size {
                if let Some(full) = current.take() {
                    chunks.push(close_chunk(full));
                }
            }
        }
        if let Some(partial) = current.take() {
            chunks.push(close_chunk(partial));
        }
        binding.cursor.seek_to_first();
        binding.chunks = Some(chunks.clone());

        tracing::debug!(
            session = %id,
            collection,
            collection_id = %binding.info.id,
            chunks = chunks.len(),
            chunk_size,
            "chunks listed"
        );
        Ok(chunks)
    }

    /// Serves one page of a chunk.
    ///
    /// Reads forward from the chunk's low key (or the resume key) until
    /// the chunk ends, `page_size` entries were emitted, or the byte budget
    /// was reached. The entry that crosses the budget is still included, so
    /// every call makes progress.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown collections or chunk indexes.
    pub fn fetch_chunk(
        &self,
        session: &mut SnapshotSession,
        fetch: &ChunkFetch,
    ) -> ReplicationResult<ChunkPage> {
        let page_size = fetch.page_size.max(self.min_chunk_size);
        let listed = session
            .bindings
            .get(&fetch.collection)
            .is_some_and(|b| b.chunks.is_some());
        if !listed {
            self.list_chunks(session, &fetch.collection, page_size)?;
        }
        let id = session.id();
        let binding = binding_mut(session, &fetch.collection)?;
        let chunk = binding
            .chunks
            .as_ref()
            .and_then(|chunks| chunks.get(fetch.index))
            .cloned()
            .ok_or_else(|| {
                ReplicationError::not_found(format!(
                    "chunk {} of collection {}",
                    fetch.index, fetch.collection
                ))
            })?;

        let start = match &fetch.resume_low {
            Some(key) if *key >= chunk.low && *key <= chunk.high => key.clone(),
            Some(key) => {
                tracing::debug!(resume = %key, low = %chunk.low, "resume key outside chunk, clamped");
                chunk.low.clone()
            }
            None => chunk.low.clone(),
        };
        binding.cursor.seek(&start);

        let filter = match fetch.mode {
            FetchMode::Docs => fetch.keys.as_ref(),
            FetchMode::Keys => None,
        };
        let mut page = PageBuilder::new(fetch.mode);
        let mut full = false;
        while let Some(entry) = binding.cursor.next_entry()? {
            if entry.key > chunk.high {
                break;
            }
            if filter.is_some_and(|keys| !keys.contains(&entry.key)) {
                continue;
            }
            page.push(entry)?;
            if page.len() >= page_size || page.bytes >= fetch.byte_budget {
                full = true;
                break;
            }
        }

        let mut resume_key = None;
        if full {
            while let Some(next) = binding.cursor.next_entry()? {
                if next.key > chunk.high {
                    break;
                }
                if filter.is_some_and(|keys| !keys.contains(&next.key)) {
                    continue;
                }
                resume_key = Some(next.key);
                break;
            }
        }

        tracing::debug!(
            session = %id,
            collection = %fetch.collection,
            chunk = fetch.index,
            mode = %fetch.mode,
            entries = page.len(),
            bytes = page.bytes,
            more = resume_key.is_some(),
            "chunk page served"
        );
        Ok(ChunkPage {
            entries: page.finish(),
            more_in_chunk: resume_key.is_some(),
            resume_key,
        })
    }
}

fn binding_mut<'s>(
    session: &'s mut SnapshotSession,
    collection: &str,
) -> ReplicationResult<&'s mut KeyBinding> {
    session
        .bindings
        .get_mut(collection)
        .ok_or_else(|| ReplicationError::not_found(format!("collection {collection} not bound")))
}

fn close_chunk((low, high, hasher): (String, String, ChunkHasher)) -> Chunk {
    Chunk {
        low,
        high,
        count: hasher.entries(),
        hash: hasher.finish(),
    }
}

/// Accumulates a page and its encoded size.
struct PageBuilder {
    entries: ChunkEntries,
    bytes: usize,
}

impl PageBuilder {
    fn new(mode: FetchMode) -> Self {
        let entries = match mode {
            FetchMode::Keys => ChunkEntries::Keys(Vec::new()),
            FetchMode::Docs => ChunkEntries::Docs(Vec::new()),
        };
        Self { entries, bytes: 0 }
    }

    fn push(&mut self, entry: DocumentVersion) -> ReplicationResult<()> {
        match &mut self.entries {
            ChunkEntries::Keys(keys) => {
                let key = KeyEntry {
                    key: entry.key,
                    rev: entry.rev.as_u64(),
                };
                self.bytes += encoded_len(&key)?;
                keys.push(key);
            }
            ChunkEntries::Docs(docs) => {
                let doc = DocumentEntry {
                    key: entry.key,
                    rev: entry.rev.as_u64(),
                    body: entry.body,
                };
                self.bytes += encoded_len(&doc)?;
                docs.push(doc);
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn finish(self) -> ChunkEntries {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReplicationConfig, SessionRegistry};
    use snapsync_storage::{CollectionKind, InMemoryEngine};
    use std::sync::Arc;

    fn setup(keys: usize) -> (Arc<InMemoryEngine>, SessionRegistry) {
        let engine = Arc::new(InMemoryEngine::new());
        engine.create_database("db").unwrap();
        engine
            .create_collection("db", "c", CollectionKind::Document)
            .unwrap();
        for i in 0..keys {
            engine
                .insert("db", "c", &format!("k{i:03}"), format!("body-{i}"))
                .unwrap();
        }
        let registry = SessionRegistry::new(engine.clone(), ReplicationConfig::default());
        (engine, registry)
    }

    #[test]
    fn bind_counts_snapshot_keys() {
        let (engine, registry) = setup(7);
        let id = registry.create("db", None).unwrap().id;
        engine.insert("db", "c", "late", "x").unwrap();

        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        assert_eq!(protocol.bind_collection(&mut session, "c").unwrap(), 7);
        // rebinding is deterministic
        assert_eq!(protocol.bind_collection(&mut session, "c").unwrap(), 7);
        assert_eq!(session.bound_collections(), vec!["c"]);
        assert!(protocol
            .bind_collection(&mut session, "nope")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn chunks_partition_keys() {
        let (_, registry) = setup(10);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();

        let chunks = protocol.list_chunks(&mut session, "c", 4).unwrap();
        let counts: Vec<u64> = chunks.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![4, 4, 2]);
        assert_eq!(chunks[0].low, "k000");
        assert_eq!(chunks[0].high, "k003");
        assert_eq!(chunks[1].low, "k004");
        assert_eq!(chunks[2].high, "k009");
    }

    #[test]
    fn fetch_keys_and_docs() {
        let (_, registry) = setup(10);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        protocol.list_chunks(&mut session, "c", 4).unwrap();

        let page = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 1, 100, FetchMode::Keys))
            .unwrap();
        assert_eq!(page.entries.keys(), vec!["k004", "k005", "k006", "k007"]);
        assert!(!page.more_in_chunk);

        let fetch = ChunkFetch::new("c", 1, 100, FetchMode::Docs)
            .with_keys(["k005".to_string(), "k007".to_string(), "k009".to_string()]);
        let page = protocol.fetch_chunk(&mut session, &fetch).unwrap();
        match page.entries {
            ChunkEntries::Docs(docs) => {
                let keys: Vec<&str> = docs.iter().map(|d| d.key.as_str()).collect();
                assert_eq!(keys, vec!["k005", "k007"]);
                assert_eq!(docs[0].body.as_ref(), b"body-5");
            }
            ChunkEntries::Keys(_) => panic!("expected documents"),
        }
    }

    #[test]
    fn paging_within_chunk() {
        let (_, registry) = setup(10);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        protocol.list_chunks(&mut session, "c", 10).unwrap();

        let first = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 0, 3, FetchMode::Keys))
            .unwrap();
        assert_eq!(first.entries.len(), 3);
        assert!(first.more_in_chunk);
        assert_eq!(first.resume_key.as_deref(), Some("k003"));

        let second = protocol
            .fetch_chunk(
                &mut session,
                &ChunkFetch::new("c", 0, 100, FetchMode::Keys).with_resume_low("k003"),
            )
            .unwrap();
        assert_eq!(second.entries.len(), 7);
        assert!(!second.more_in_chunk);
    }

    #[test]
    fn byte_budget_still_makes_progress() {
        let (_, registry) = setup(5);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        protocol.list_chunks(&mut session, "c", 5).unwrap();

        let fetch = ChunkFetch::new("c", 0, 100, FetchMode::Docs).with_byte_budget(1);
        let page = protocol.fetch_chunk(&mut session, &fetch).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.resume_key.as_deref(), Some("k001"));
    }

    #[test]
    fn resume_outside_chunk_is_clamped() {
        let (_, registry) = setup(8);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        protocol.list_chunks(&mut session, "c", 4).unwrap();

        let clamped = protocol
            .fetch_chunk(
                &mut session,
                &ChunkFetch::new("c", 1, 100, FetchMode::Keys).with_resume_low("k000"),
            )
            .unwrap();
        let fresh = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 1, 100, FetchMode::Keys))
            .unwrap();
        assert_eq!(clamped, fresh);
    }

    #[test]
    fn empty_collection() {
        let (_, registry) = setup(0);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        assert!(protocol.list_chunks(&mut session, "c", 10).unwrap().is_empty());
        let err = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 0, 10, FetchMode::Keys))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn fetch_without_listing_uses_page_size() {
        let (_, registry) = setup(6);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        let page = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 1, 4, FetchMode::Keys))
            .unwrap();
        assert_eq!(page.entries.keys(), vec!["k004", "k005"]);
    }

    #[test]
    fn dropped_collection_still_binds() {
        let (engine, registry) = setup(5);
        let id = registry.create("db", None).unwrap().id;
        engine.drop_collection("db", "c").unwrap();

        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        assert_eq!(protocol.bind_collection(&mut session, "c").unwrap(), 5);
        let page = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 0, 100, FetchMode::Keys))
            .unwrap();
        assert_eq!(page.entries.len(), 5);
    }

    #[test]
    fn recreated_collection_binds_snapshot_contents() {
        let (engine, registry) = setup(5);
        let id = registry.create("db", None).unwrap().id;
        engine.drop_collection("db", "c").unwrap();
        engine
            .create_collection("db", "c", CollectionKind::Document)
            .unwrap();
        engine.insert("db", "c", "fresh", "x").unwrap();

        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        assert_eq!(protocol.bind_collection(&mut session, "c").unwrap(), 5);
        let chunks = protocol.list_chunks(&mut session, "c", 10).unwrap();
        assert_eq!(chunks[0].low, "k000");
        assert_eq!(chunks[0].high, "k004");

        // a fresh session only sees the new collection
        let fresh = registry.create("db", None).unwrap().id;
        let mut fresh = registry.checkout(fresh).unwrap();
        assert_eq!(protocol.bind_collection(&mut fresh, "c").unwrap(), 1);
    }

    #[test]
    fn rebind_keeps_listed_partition() {
        let (_, registry) = setup(10);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new();
        let chunks = protocol.list_chunks(&mut session, "c", 3).unwrap();
        assert_eq!(chunks[1].low, "k003");

        protocol.bind_collection(&mut session, "c").unwrap();
        let page = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 1, 1, FetchMode::Keys))
            .unwrap();
        assert_eq!(page.entries.keys(), vec!["k003"]);
        assert_eq!(page.resume_key.as_deref(), Some("k004"));
    }

    #[test]
    fn min_chunk_size_raises_small_requests() {
        let (_, registry) = setup(10);
        let id = registry.create("db", None).unwrap().id;
        let mut session = registry.checkout(id).unwrap();
        let protocol = KeyChunkProtocol::new().with_min_chunk_size(5);

        let counts: Vec<u64> = protocol
            .list_chunks(&mut session, "c", 2)
            .unwrap()
            .iter()
            .map(|c| c.count)
            .collect();
        assert_eq!(counts, vec![5, 5]);
        let page = protocol
            .fetch_chunk(&mut session, &ChunkFetch::new("c", 0, 1, FetchMode::Keys))
            .unwrap();
        assert_eq!(page.entries.len(), 5);
        assert!(!page.more_in_chunk);
    }
}
