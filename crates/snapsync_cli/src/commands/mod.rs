//! CLI command implementations.
//!
//! Every command runs through [`ReplicationServer`] exactly as a follower
//! request would, and returns its rendered output.

pub mod chunks;
pub mod dump;
pub mod fetch;
pub mod inventory;
pub mod tail;

use crate::error::CliResult;
use serde::Serialize;
use snapsync_protocol::CreateSessionRequest;
use snapsync_server::ReplicationServer;

/// Opens a session on `database` that is not tracked as a follower.
fn open_session(server: &ReplicationServer, database: &str) -> CliResult<u64> {
    let created = server.create_session(CreateSessionRequest {
        database: database.to_string(),
        ttl: None,
        server_id: Some("none".into()),
    })?;
    Ok(created.id)
}

/// Renders `value` as pretty JSON, or with `text` for any other format.
fn render<T: Serialize>(format: &str, value: &T, text: impl FnOnce(&T) -> String) -> CliResult<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(value)?),
        _ => Ok(text(value)),
    }
}

/// Printable form of a document body.
fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[cfg(test)]
pub(crate) mod tests {
    use snapsync_server::{ReplicationServer, ServerConfig};
    use snapsync_testkit::{sample_fixture_json, TempFixture};

    /// Server over the testkit sample fixture.
    pub(crate) fn sample_server() -> ReplicationServer {
        let file = TempFixture::write(&sample_fixture_json());
        let engine = crate::fixture::load(file.path()).unwrap();
        ReplicationServer::new(engine, ServerConfig::default().with_reaper(false))
    }
}
