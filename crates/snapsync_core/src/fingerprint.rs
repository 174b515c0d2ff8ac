//! Chunk content fingerprints.
//!
//! A fingerprint is SHA-256 over the chunk's entries in key order. Each
//! entry contributes
//!
//! ```text
//! | key len (u64 LE) | key bytes | rev (u64 LE) | body len (u64 LE) | body bytes |
//! ```
//!
//! Length prefixes keep entry boundaries unambiguous, so moving bytes
//! between a key and its body, or between neighbouring entries, changes
//! the digest.

use sha2::{Digest, Sha256};
use snapsync_storage::DocumentVersion;

/// Incremental fingerprint of one chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkHasher {
    hasher: Sha256,
    entries: u64,
}

impl ChunkHasher {
    /// Creates a hasher for an empty chunk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next entry in key order.
    pub fn update(&mut self, entry: &DocumentVersion) {
        self.hasher.update((entry.key.len() as u64).to_le_bytes());
        self.hasher.update(entry.key.as_bytes());
        self.hasher.update(entry.rev.as_u64().to_le_bytes());
        self.hasher.update((entry.body.len() as u64).to_le_bytes());
        self.hasher.update(&entry.body);
        self.entries += 1;
    }

    /// Number of entries fed so far.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Returns the hex-encoded digest.
    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Fingerprints a complete sequence of entries.
#[must_use]
pub fn fingerprint<'a>(entries: impl IntoIterator<Item = &'a DocumentVersion>) -> String {
    let mut hasher = ChunkHasher::new();
    for entry in entries {
        hasher.update(entry);
    }
    hasher.finish()
}
