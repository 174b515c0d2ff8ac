//! Dump command implementation.

use super::{body_text, open_session};
use crate::error::CliResult;
use snapsync_protocol::{DocumentEntry, DumpRequest};
use snapsync_server::ReplicationServer;
use std::fmt::Write;

/// Runs the dump command, following `check_more` until the collection is
/// exhausted.
pub fn run(
    server: &ReplicationServer,
    database: &str,
    collection: &str,
    chunk_size: Option<u64>,
    format: &str,
) -> CliResult<String> {
    let session_id = open_session(server, database)?;
    let documents = collect(server, session_id, collection, chunk_size);
    server.delete_session(session_id)?;
    let (documents, batches) = documents?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&documents)?),
        _ => {
            let mut out = String::new();
            let _ = writeln!(out, "{} documents in {} batches", documents.len(), batches);
            for doc in &documents {
                let _ = writeln!(out, "{:24} rev={} {}", doc.key, doc.rev, body_text(&doc.body));
            }
            Ok(out)
        }
    }
}

fn collect(
    server: &ReplicationServer,
    session_id: u64,
    collection: &str,
    chunk_size: Option<u64>,
) -> CliResult<(Vec<DocumentEntry>, usize)> {
    let mut documents = Vec::new();
    let mut batches = 0;
    loop {
        let batch = server.dump(DumpRequest {
            session_id,
            collection: collection.to_string(),
            chunk_size,
        })?;
        batches += 1;
        documents.extend(batch.documents);
        if !batch.check_more {
            return Ok((documents, batches));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_server;

    #[test]
    fn dump_text() {
        let server = sample_server();
        let out = run(&server, "app", "users", None, "text").unwrap();
        assert!(out.starts_with("3 documents in 1 batches"));
        assert!(out.contains("alice"));
    }

    #[test]
    fn dump_json() {
        let server = sample_server();
        let out = run(&server, "app", "follows", None, "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["key"], "e1");
    }
}
