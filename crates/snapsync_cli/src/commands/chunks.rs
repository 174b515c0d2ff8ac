//! Chunks command implementation.

use super::{open_session, render};
use crate::error::CliResult;
use snapsync_protocol::{BindKeysRequest, ChunkList, ListChunksRequest};
use snapsync_server::ReplicationServer;
use std::fmt::Write;

/// Runs the chunks command.
pub fn run(
    server: &ReplicationServer,
    database: &str,
    collection: &str,
    chunk_size: Option<u64>,
    format: &str,
) -> CliResult<String> {
    let session_id = open_session(server, database)?;
    let listed = list(server, session_id, collection, chunk_size);
    server.delete_session(session_id)?;
    let (count, chunks) = listed?;
    render(format, &chunks, |chunks| print_text_output(count, chunks))
}

fn list(
    server: &ReplicationServer,
    session_id: u64,
    collection: &str,
    chunk_size: Option<u64>,
) -> CliResult<(u64, ChunkList)> {
    let bound = server.bind_keys(BindKeysRequest {
        session_id,
        collection: collection.to_string(),
    })?;
    let chunks = server.list_chunks(ListChunksRequest {
        session_id,
        collection: collection.to_string(),
        chunk_size,
    })?;
    Ok((bound.count, chunks))
}

fn print_text_output(count: u64, list: &ChunkList) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} keys in {} chunks", count, list.chunks.len());
    for (index, chunk) in list.chunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{index:>4}] {}..{} count={} hash={}",
            chunk.low, chunk.high, chunk.count, chunk.hash
        );
    }
    out
}
