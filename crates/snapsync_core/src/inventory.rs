//! Point-in-time inventory of collections.

use crate::error::ReplicationResult;
use crate::session::SnapshotSession;
use chrono::{SecondsFormat, Utc};
use snapsync_protocol::{
    CollectionDescriptor, DatabaseInventory, InventoryResponse, ReplicationState,
};
use snapsync_storage::{CollectionInfo, CollectionKind, StorageEngine};
use std::collections::BTreeMap;

/// Joins the live catalog with a session's tick state.
pub struct InventorySnapshotBuilder<'a> {
    engine: &'a dyn StorageEngine,
}

impl<'a> InventorySnapshotBuilder<'a> {
    /// Creates a builder over an engine's catalog.
    pub fn new(engine: &'a dyn StorageEngine) -> Self {
        Self { engine }
    }

    /// Builds the inventory for `session`.
    ///
    /// With `all_databases` the response carries a `databases` map,
    /// otherwise the `collections` of the session's database.
    ///
    /// # Errors
    ///
    /// `NotFound` if the session's database no longer exists.
    pub fn build(
        &self,
        session: &SnapshotSession,
        include_system: bool,
        all_databases: bool,
    ) -> ReplicationResult<InventoryResponse> {
        let (collections, databases) = if all_databases {
            let mut databases = BTreeMap::new();
            for name in self.engine.databases() {
                let collections = self.describe(&name, include_system)?;
                databases.insert(name, DatabaseInventory { collections });
            }
            (None, Some(databases))
        } else {
            (Some(self.describe(session.database(), include_system)?), None)
        };

        let last_tick = session.last_tick().as_u64();
        let response = InventoryResponse {
            collections,
            databases,
            state: ReplicationState {
                running: true,
                last_log_tick: last_tick,
                last_uncommitted_log_tick: last_tick,
                total_events: last_tick,
                time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            tick: self.engine.log().latest_tick().as_u64(),
        };
        tracing::debug!(
            session = %session.id(),
            all_databases,
            include_system,
            last_tick,
            "inventory built"
        );
        Ok(response)
    }

    fn describe(
        &self,
        database: &str,
        include_system: bool,
    ) -> ReplicationResult<Vec<CollectionDescriptor>> {
        Ok(self
            .engine
            .collections(database)?
            .into_iter()
            .filter(|c| include_system || !c.is_system())
            .map(descriptor)
            .collect())
    }
}

fn descriptor(info: CollectionInfo) -> CollectionDescriptor {
    let is_system = info.is_system();
    CollectionDescriptor {
        id: info.id.as_u64(),
        kind: match info.kind {
            CollectionKind::Document => "document".to_string(),
            CollectionKind::Edge => "edge".to_string(),
        },
        name: info.name,
        is_system,
        created_tick: info.created_tick.as_u64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReplicationConfig, SessionRegistry};
    use snapsync_storage::InMemoryEngine;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryEngine>, SessionRegistry) {
        let engine = Arc::new(InMemoryEngine::new());
        engine.create_database("app").unwrap();
        engine.create_database("audit").unwrap();
        engine
            .create_collection("app", "users", CollectionKind::Document)
            .unwrap();
        engine
            .create_collection("app", "_graphs", CollectionKind::Document)
            .unwrap();
        engine
            .create_collection("app", "knows", CollectionKind::Edge)
            .unwrap();
        engine
            .create_collection("audit", "events", CollectionKind::Document)
            .unwrap();
        let registry = SessionRegistry::new(engine.clone(), ReplicationConfig::default());
        (engine, registry)
    }

    #[test]
    fn database_scope() {
        let (engine, registry) = setup();
        let id = registry.create("app", None).unwrap().id;
        engine.insert("app", "users", "u1", "{}").unwrap();

        let session = registry.checkout(id).unwrap();
        let inventory = InventorySnapshotBuilder::new(engine.as_ref())
            .build(&session, false, false)
            .unwrap();
        let names: Vec<&str> = inventory
            .collections
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["users", "knows"]);
        assert!(inventory.databases.is_none());
        assert_eq!(inventory.state.last_log_tick, 4);
        assert_eq!(inventory.state.total_events, 4);
        assert_eq!(inventory.tick, 5);
        assert!(inventory.state.running);
    }

    #[test]
    fn global_scope() {
        let (engine, registry) = setup();
        let id = registry.create("app", None).unwrap().id;
        let session = registry.checkout(id).unwrap();
        let inventory = InventorySnapshotBuilder::new(engine.as_ref())
            .build(&session, true, true)
            .unwrap();
        let databases = inventory.databases.unwrap();
        assert_eq!(databases.len(), 2);
        assert_eq!(databases["app"].collections.len(), 3);
        assert_eq!(databases["audit"].collections[0].kind, "document");
        assert!(inventory.collections.is_none());
    }
}
