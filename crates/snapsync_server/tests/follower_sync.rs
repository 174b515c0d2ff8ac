//! A follower synchronizing through the request surface.

use snapsync_core::SessionId;
use snapsync_protocol::{
    decode_cbor, encode_cbor, BindKeysRequest, ChunkEntries, CreateSessionRequest, DumpRequest,
    FetchChunkRequest, InventoryRequest, ListChunksRequest, MarkerType, TailRequest,
    TailResponse,
};
use snapsync_server::{ReplicationServer, ServerConfig};
use snapsync_storage::Tick;
use snapsync_testkit::prelude::*;
use std::collections::BTreeMap;

fn server(fixture: &TestEngine) -> ReplicationServer {
    ReplicationServer::new(
        fixture.engine.clone(),
        ServerConfig::default()
            .with_reaper(false)
            .with_min_chunk_size(1)
            .with_default_chunk_size(7),
    )
}

fn open(server: &ReplicationServer) -> (u64, u64) {
    let created = server
        .create_session(CreateSessionRequest {
            database: TEST_DATABASE.into(),
            ttl: Some(60),
            server_id: Some("follower".into()),
        })
        .unwrap();
    (created.id, created.last_tick)
}

fn copy_collection(server: &ReplicationServer, session_id: u64) -> BTreeMap<String, Vec<u8>> {
    let chunks = server
        .list_chunks(ListChunksRequest {
            session_id,
            collection: TEST_COLLECTION.into(),
            chunk_size: Some(7),
        })
        .unwrap()
        .chunks;
    let mut copy = BTreeMap::new();
    for index in 0..chunks.len() {
        let mut low = None;
        loop {
            let page = server
                .fetch_chunk(FetchChunkRequest {
                    session_id,
                    collection: TEST_COLLECTION.into(),
                    chunk: index as u64,
                    chunk_size: Some(3),
                    low: low.take(),
                    fetch_type: "docs".into(),
                    offset: None,
                    keys: None,
                })
                .unwrap();
            let ChunkEntries::Docs(docs) = page.entries else {
                panic!("docs mode returned keys");
            };
            for doc in docs {
                copy.insert(doc.key, doc.body.to_vec());
            }
            if !page.more_in_chunk {
                break;
            }
            low = page.resume_key;
        }
    }
    copy
}

#[test]
fn initial_sync_then_tail() {
    let fixture = populated_engine(25);
    let server = server(&fixture);
    let (session_id, snapshot_tick) = open(&server);
    fixture.insert(&document_key(3), "changed");
    fixture.insert(&document_key(99), "new");

    let inventory = server
        .inventory(InventoryRequest {
            session_id,
            include_system: Some(false),
            global: None,
        })
        .unwrap();
    assert_eq!(inventory.collections.unwrap()[0].name, TEST_COLLECTION);
    assert_eq!(inventory.state.last_log_tick, snapshot_tick);

    let bound = server
        .bind_keys(BindKeysRequest {
            session_id,
            collection: TEST_COLLECTION.into(),
        })
        .unwrap();
    assert_eq!(bound.count, 25);

    let mut copy = copy_collection(&server, session_id);
    let expected: BTreeMap<String, Vec<u8>> =
        (0..25).map(|i| (document_key(i), document_body(i))).collect();
    assert_eq!(copy, expected);
    server.delete_session(session_id).unwrap();

    let tail = server
        .tail(TailRequest {
            database: TEST_DATABASE.into(),
            from: Some(snapshot_tick + 1),
            server_id: Some("follower".into()),
            ..TailRequest::default()
        })
        .unwrap();
    for marker in &tail.markers {
        assert_eq!(marker.marker_type, MarkerType::Insert);
        let key = marker.key.clone().unwrap();
        let body = marker.data.clone().unwrap();
        copy.insert(key, body.to_vec());
    }
    assert_eq!(copy.len(), 26);
    assert_eq!(copy[&document_key(3)], b"changed".to_vec());
    assert_eq!(tail.headers.last_included, server.latest_tick().as_u64());
    assert!(!tail.headers.check_more);
    assert_eq!(
        server.clients().get("follower").unwrap().last_served_tick,
        server.latest_tick()
    );
}

#[test]
fn busy_session_is_409() {
    let fixture = populated_engine(5);
    let server = server(&fixture);
    let (session_id, _) = open(&server);

    let held = server.registry().checkout(SessionId::new(session_id)).unwrap();
    let err = server
        .list_chunks(ListChunksRequest {
            session_id,
            collection: TEST_COLLECTION.into(),
            chunk_size: None,
        })
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
    drop(held);

    assert!(server
        .list_chunks(ListChunksRequest {
            session_id,
            collection: TEST_COLLECTION.into(),
            chunk_size: None,
        })
        .is_ok());
}

#[test]
fn deleted_session_is_404() {
    let fixture = populated_engine(5);
    let server = server(&fixture);
    let (session_id, _) = open(&server);
    server.delete_session(session_id).unwrap();

    let err = server
        .dump(DumpRequest {
            session_id,
            collection: TEST_COLLECTION.into(),
            chunk_size: None,
        })
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(server.delete_session(session_id).unwrap_err().status_code(), 404);
}

#[test]
fn dump_pages_through_collection() {
    let fixture = populated_engine(2000);
    let server = server(&fixture);
    let (session_id, snapshot_tick) = open(&server);

    let mut total = 0;
    let mut batches = 0;
    loop {
        let batch = server
            .dump(DumpRequest {
                session_id,
                collection: TEST_COLLECTION.into(),
                chunk_size: Some(1),
            })
            .unwrap();
        total += batch.documents.len();
        batches += 1;
        if !batch.documents.is_empty() {
            assert_eq!(batch.last_included, snapshot_tick);
        }
        if !batch.check_more {
            break;
        }
    }
    assert_eq!(total, 2000);
    assert!(batches > 1, "16 KiB minimum budget should split 2000 documents");
}

#[test]
fn tail_response_survives_cbor() {
    let fixture = populated_engine(5);
    let server = server(&fixture);
    let response = server
        .tail(TailRequest {
            database: TEST_DATABASE.into(),
            from: Some(2),
            to: Some(4),
            ..TailRequest::default()
        })
        .unwrap();
    let bytes = encode_cbor(&response).unwrap();
    let decoded: TailResponse = decode_cbor(&bytes).unwrap();
    assert_eq!(decoded, response);
    assert_eq!(decoded.headers.last_included, 4);
    assert!(decoded.headers.check_more);
    assert_eq!(decoded.headers.last_tick, 6);
}

#[test]
fn pruned_history_is_reported() {
    let fixture = populated_engine(10);
    let server = server(&fixture);
    assert_eq!(server.prune_log(Tick::new(5)), 5);

    let gap = server
        .tail(TailRequest {
            database: TEST_DATABASE.into(),
            from: Some(3),
            ..TailRequest::default()
        })
        .unwrap();
    assert!(!gap.headers.from_present);
    assert_eq!(gap.markers.first().map(|m| m.tick), Some(6));

    let present = server
        .tail(TailRequest {
            database: TEST_DATABASE.into(),
            from: Some(6),
            ..TailRequest::default()
        })
        .unwrap();
    assert!(present.headers.from_present);
}
