//! Test fixtures and engine helpers.

use serde_json::{json, Value};
use snapsync_storage::{CollectionInfo, CollectionKind, InMemoryEngine, Tick};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Database name used by the fixtures.
pub const TEST_DATABASE: &str = "app";

/// Collection name used by the fixtures.
pub const TEST_COLLECTION: &str = "docs";

/// An engine with one database and one document collection.
pub struct TestEngine {
    /// The engine.
    pub engine: Arc<InMemoryEngine>,
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
    /// Catalog entry of the collection.
    pub info: CollectionInfo,
}

impl TestEngine {
    /// Creates an engine holding an empty collection.
    pub fn empty() -> Self {
        let engine = Arc::new(InMemoryEngine::new());
        engine
            .create_database(TEST_DATABASE)
            .expect("Failed to create database");
        let info = engine
            .create_collection(TEST_DATABASE, TEST_COLLECTION, CollectionKind::Document)
            .expect("Failed to create collection");
        Self {
            engine,
            database: TEST_DATABASE.to_string(),
            collection: TEST_COLLECTION.to_string(),
            info,
        }
    }

    /// Inserts a document into the fixture collection.
    pub fn insert(&self, key: &str, body: impl Into<bytes::Bytes>) -> Tick {
        self.engine
            .insert(&self.database, &self.collection, key, body)
            .expect("Failed to insert document")
    }

    /// Inserts every `(key, body)` pair in order.
    pub fn insert_all<I, K, B>(&self, documents: I)
    where
        I: IntoIterator<Item = (K, B)>,
        K: AsRef<str>,
        B: Into<bytes::Bytes>,
    {
        for (key, body) in documents {
            self.insert(key.as_ref(), body);
        }
    }
}

/// Zero-padded key, so numeric and lexicographic order agree.
pub fn document_key(index: usize) -> String {
    format!("key{index:06}")
}

/// JSON body of the document at `index`.
pub fn document_body(index: usize) -> Vec<u8> {
    format!(r#"{{"index":{index}}}"#).into_bytes()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates an engine whose collection holds `count` documents.
    pub fn populated_engine(count: usize) -> TestEngine {
        let fixture = TestEngine::empty();
        fixture.insert_all((0..count).map(|i| (document_key(i), document_body(i))));
        fixture
    }

    /// Creates a log of exactly `count` records (ticks `1..=count`): the
    /// collection creation followed by `count - 1` inserts.
    pub fn log_of_len(count: u64) -> TestEngine {
        let fixture = TestEngine::empty();
        for i in 1..count {
            fixture.insert(&document_key(i as usize), document_body(i as usize));
        }
        fixture
    }

    /// Creates an engine with a user collection, a system collection and a
    /// second database.
    pub fn multi_collection_engine() -> TestEngine {
        let fixture = populated_engine(3);
        let engine = &fixture.engine;
        engine
            .create_collection(TEST_DATABASE, "_system", CollectionKind::Document)
            .expect("Failed to create collection");
        engine
            .create_collection(TEST_DATABASE, "edges", CollectionKind::Edge)
            .expect("Failed to create collection");
        engine
            .create_database("other")
            .expect("Failed to create database");
        engine
            .create_collection("other", "things", CollectionKind::Document)
            .expect("Failed to create collection");
        engine
            .insert(TEST_DATABASE, "_system", "config", "{}")
            .expect("Failed to insert document");
        fixture
    }
}

pub use scenarios::*;

/// A fixture file in a temporary directory, deleted on drop.
pub struct TempFixture {
    dir: TempDir,
    path: PathBuf,
}

impl TempFixture {
    /// Writes `value` as pretty JSON to a fresh temporary file.
    pub fn write(value: &Value) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("fixture.json");
        let mut file = std::fs::File::create(&path).expect("Failed to create fixture file");
        let text = serde_json::to_string_pretty(value).expect("Failed to render fixture");
        file.write_all(text.as_bytes())
            .expect("Failed to write fixture file");
        Self { dir, path }
    }

    /// Path of the fixture file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temporary directory holding the file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// A small fixture document in the command-line loader format.
pub fn sample_fixture_json() -> Value {
    json!({
        "databases": {
            "app": {
                "collections": {
                    "users": {
                        "type": "document",
                        "documents": {
                            "alice": {"age": 30},
                            "bob": {"age": 41},
                            "carol": {"age": 27}
                        }
                    },
                    "_jobs": {
                        "type": "document",
                        "documents": {
                            "j1": {"state": "done"}
                        }
                    },
                    "follows": {
                        "type": "edge",
                        "documents": {
                            "e1": {"_from": "users/alice", "_to": "users/bob"}
                        }
                    }
                }
            }
        }
    })
}
