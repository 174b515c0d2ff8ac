//! Fetch command implementation.

use super::{body_text, open_session, render};
use crate::error::CliResult;
use snapsync_protocol::{ChunkEntries, ChunkPage, FetchChunkRequest};
use snapsync_server::ReplicationServer;
use std::fmt::Write;

/// Parameters of the fetch command.
pub struct FetchArgs<'a> {
    /// Collection name.
    pub collection: &'a str,
    /// Chunk index.
    pub chunk: u64,
    /// `keys` or `docs`.
    pub fetch_type: &'a str,
    /// Chunk size used for partitioning and paging.
    pub chunk_size: Option<u64>,
    /// Key to resume from.
    pub low: Option<String>,
}

/// Runs the fetch command.
pub fn run(
    server: &ReplicationServer,
    database: &str,
    args: FetchArgs<'_>,
    format: &str,
) -> CliResult<String> {
    let session_id = open_session(server, database)?;
    let page = server.fetch_chunk(FetchChunkRequest {
        session_id,
        collection: args.collection.to_string(),
        chunk: args.chunk,
        chunk_size: args.chunk_size,
        low: args.low,
        fetch_type: args.fetch_type.to_string(),
        offset: None,
        keys: None,
    });
    server.delete_session(session_id)?;
    render(format, &page?, print_text_output)
}

fn print_text_output(page: &ChunkPage) -> String {
    let mut out = String::new();
    match &page.entries {
        ChunkEntries::Keys(keys) => {
            for entry in keys {
                let _ = writeln!(out, "{:24} rev={}", entry.key, entry.rev);
            }
        }
        ChunkEntries::Docs(docs) => {
            for doc in docs {
                let _ = writeln!(out, "{:24} rev={} {}", doc.key, doc.rev, body_text(&doc.body));
            }
        }
    }
    if let Some(resume) = &page.resume_key {
        let _ = writeln!(out, "... more in chunk, resume at {resume}");
    }
    out
}
