//! Tail command implementation.

use super::{body_text, render};
use crate::error::CliResult;
use snapsync_protocol::{TailRequest, TailResponse};
use snapsync_server::ReplicationServer;
use std::fmt::Write;

/// Runs the tail command.
pub fn run(
    server: &ReplicationServer,
    request: TailRequest,
    format: &str,
) -> CliResult<String> {
    let response = server.tail(request)?;
    render(format, &response, print_text_output)
}

fn print_text_output(response: &TailResponse) -> String {
    let h = &response.headers;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "checkMore={} lastIncluded={} lastScanned={} lastTick={} fromPresent={}",
        h.check_more, h.last_included, h.last_scanned, h.last_tick, h.from_present
    );
    for marker in &response.markers {
        let _ = write!(
            out,
            "[{:>8}] {:4} {:18}",
            marker.tick,
            marker.marker_type.code(),
            format!("{:?}", marker.marker_type)
        );
        if let Some(tid) = marker.tid {
            let _ = write!(out, " tid={tid}");
        }
        if let Some(name) = &marker.cname {
            let _ = write!(out, " collection={name}");
        }
        if let Some(key) = &marker.key {
            let _ = write!(out, " key={key}");
        }
        if let Some(data) = &marker.data {
            let _ = write!(out, " {}", body_text(data));
        }
        out.push('\n');
    }
    out
}
