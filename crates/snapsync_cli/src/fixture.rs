//! JSON fixture loading.
//!
//! A fixture describes databases, their collections and documents:
//!
//! ```json
//! {
//!   "databases": {
//!     "app": {
//!       "collections": {
//!         "users": { "type": "document", "documents": { "alice": {"age": 30} } }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Documents are stored as their JSON text. Collections and documents are
//! created in name order, so the resulting log is deterministic.

use crate::error::CliResult;
use serde::Deserialize;
use snapsync_storage::{CollectionKind, InMemoryEngine};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    databases: BTreeMap<String, FixtureDatabase>,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureDatabase {
    #[serde(default)]
    collections: BTreeMap<String, FixtureCollection>,
}

#[derive(Debug, Deserialize)]
struct FixtureCollection {
    #[serde(rename = "type", default)]
    kind: FixtureKind,
    #[serde(default)]
    documents: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FixtureKind {
    #[default]
    Document,
    Edge,
}

impl From<FixtureKind> for CollectionKind {
    fn from(kind: FixtureKind) -> Self {
        match kind {
            FixtureKind::Document => CollectionKind::Document,
            FixtureKind::Edge => CollectionKind::Edge,
        }
    }
}

/// Loads the fixture at `path` into a fresh engine.
pub fn load(path: &Path) -> CliResult<Arc<InMemoryEngine>> {
    let text = std::fs::read_to_string(path)?;
    let fixture: FixtureFile = serde_json::from_str(&text)?;
    let engine = Arc::new(InMemoryEngine::new());

    for (database, contents) in &fixture.databases {
        engine.create_database(database)?;
        for (name, collection) in &contents.collections {
            engine.create_collection(database, name, collection.kind.into())?;
            for (key, document) in &collection.documents {
                engine.insert(database, name, key, serde_json::to_vec(document)?)?;
            }
        }
    }
    tracing::debug!(
        path = %path.display(),
        databases = fixture.databases.len(),
        "fixture loaded"
    );
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsync_storage::{ChangeLog, StorageEngine};
    use snapsync_testkit::TempFixture;

    #[test]
    fn loads_sample() {
        let file = TempFixture::write(&snapsync_testkit::sample_fixture_json());
        let engine = load(file.path()).unwrap();
        assert_eq!(engine.databases(), vec!["app".to_string()]);
        assert_eq!(engine.count("app", "users").unwrap(), 3);
        let follows = engine.collection("app", "follows").unwrap().unwrap();
        assert_eq!(follows.kind, CollectionKind::Edge);
        // 3 collections + 5 documents
        assert_eq!(engine.log().latest_tick().as_u64(), 8);
        let alice = engine.get("app", "users", "alice").unwrap().unwrap();
        assert_eq!(&alice.body[..], br#"{"age":30}"#);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn malformed_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"databases\": 3}").unwrap();
        assert!(matches!(load(&path), Err(crate::error::CliError::Json(_))));
    }
}
