//! Property-based test generators using proptest.
//!
//! Provides strategies for generating collections and write workloads.

use proptest::prelude::*;
use snapsync_storage::InMemoryEngine;
use std::collections::BTreeMap;

/// Strategy for generating document keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for generating document bodies (arbitrary bytes).
pub fn body_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for generating the contents of a collection.
pub fn collection_contents_strategy(
    max_documents: usize,
) -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(key_strategy(), body_strategy(), 0..max_documents)
}

/// Strategy for generating chunk sizes.
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..20
}

/// A single write against the fixture collection.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace.
    Insert(String, Vec<u8>),
    /// Remove if present.
    Remove(String),
    /// A multi-document transaction, committed or aborted.
    Transaction {
        /// Documents written.
        puts: Vec<(String, Vec<u8>)>,
        /// Whether the transaction commits.
        commit: bool,
    },
}

/// Strategy for generating write operations.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        4 => (key_strategy(), body_strategy()).prop_map(|(k, b)| WriteOp::Insert(k, b)),
        1 => key_strategy().prop_map(WriteOp::Remove),
        1 => (
            prop::collection::vec((key_strategy(), body_strategy()), 1..4),
            any::<bool>()
        )
            .prop_map(|(puts, commit)| WriteOp::Transaction { puts, commit }),
    ]
}

/// Strategy for generating a sequence of write operations.
pub fn write_ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(), 0..max_ops)
}

/// Applies `ops` to `collection` of `database`.
pub fn apply_ops(engine: &InMemoryEngine, database: &str, collection: &str, ops: &[WriteOp]) {
    for op in ops {
        match op {
            WriteOp::Insert(key, body) => {
                engine
                    .insert(database, collection, key, body.clone())
                    .expect("Failed to insert document");
            }
            WriteOp::Remove(key) => {
                engine
                    .remove(database, collection, key)
                    .expect("Failed to remove document");
            }
            WriteOp::Transaction { puts, commit } => {
                let mut txn = engine.begin(database).expect("Failed to begin transaction");
                for (key, body) in puts {
                    txn.put(collection, key, body.clone())
                        .expect("Failed to stage write");
                }
                if *commit {
                    txn.commit().expect("Failed to commit");
                } else {
                    txn.abort().expect("Failed to abort");
                }
            }
        }
    }
}

/// Expected collection contents after applying `ops` to an empty collection.
pub fn model_contents(ops: &[WriteOp]) -> BTreeMap<String, Vec<u8>> {
    let mut model = BTreeMap::new();
    for op in ops {
        match op {
            WriteOp::Insert(key, body) => {
                model.insert(key.clone(), body.clone());
            }
            WriteOp::Remove(key) => {
                model.remove(key);
            }
            WriteOp::Transaction { puts, commit: true } => {
                for (key, body) in puts {
                    model.insert(key.clone(), body.clone());
                }
            }
            WriteOp::Transaction { commit: false, .. } => {}
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestEngine;

    proptest! {
        #[test]
        fn test_keys_are_nonempty(key in key_strategy()) {
            prop_assert!(!key.is_empty());
        }

        #[test]
        fn test_apply_matches_model(ops in write_ops_strategy(30)) {
            let fixture = TestEngine::empty();
            apply_ops(&fixture.engine, &fixture.database, &fixture.collection, &ops);
            let model = model_contents(&ops);
            prop_assert_eq!(
                fixture.engine.count(&fixture.database, &fixture.collection).unwrap(),
                model.len()
            );
        }
    }
}
