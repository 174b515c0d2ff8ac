//! CBOR behaviour of composite wire messages.

use bytes::Bytes;
use proptest::prelude::*;
use snapsync_protocol::{
    decode_cbor, encode_cbor, encoded_len, ChunkEntries, ChunkPage, DocumentEntry, LogMarker,
    MarkerType, TailHeaders, TailResponse,
};

fn marker(tick: u64, body: &[u8]) -> LogMarker {
    LogMarker {
        tick,
        marker_type: MarkerType::Insert,
        database: "app".into(),
        tid: None,
        cid: Some(4),
        cname: Some("users".into()),
        key: Some(format!("k{tick}")),
        rev: Some(tick),
        data: Some(Bytes::copy_from_slice(body)),
    }
}

#[test]
fn tail_response_survives_cbor() {
    let response = TailResponse {
        headers: TailHeaders {
            check_more: true,
            last_included: 2,
            last_scanned: 3,
            last_tick: 10,
            from_present: true,
            active: true,
        },
        markers: vec![marker(1, b"{}"), marker(2, b"{\"a\":1}")],
    };
    let bytes = encode_cbor(&response).unwrap();
    let back: TailResponse = decode_cbor(&bytes).unwrap();
    assert_eq!(back, response);
}

#[test]
fn docs_page_survives_cbor() {
    let page = ChunkPage {
        entries: ChunkEntries::Docs(vec![DocumentEntry {
            key: "a".into(),
            rev: 9,
            body: Bytes::from_static(b"\x01\x02"),
        }]),
        more_in_chunk: false,
        resume_key: None,
    };
    let back: ChunkPage = decode_cbor(&encode_cbor(&page).unwrap()).unwrap();
    assert_eq!(back, page);
}

proptest! {
    #[test]
    fn encoded_len_grows_with_body(body in prop::collection::vec(any::<u8>(), 0..512), extra in 1usize..64) {
        let small = marker(1, &body);
        let mut bigger_body = body.clone();
        bigger_body.extend(std::iter::repeat(0u8).take(extra));
        let big = marker(1, &bigger_body);
        prop_assert!(encoded_len(&big).unwrap() > encoded_len(&small).unwrap());
        prop_assert_eq!(encoded_len(&small).unwrap(), encode_cbor(&small).unwrap().len());
    }
}
