//! Inventory command implementation.

use super::{open_session, render};
use crate::error::CliResult;
use snapsync_protocol::{CollectionDescriptor, InventoryRequest, InventoryResponse};
use snapsync_server::ReplicationServer;
use std::fmt::Write;

/// Runs the inventory command.
pub fn run(
    server: &ReplicationServer,
    database: &str,
    global: bool,
    include_system: bool,
    format: &str,
) -> CliResult<String> {
    let session_id = open_session(server, database)?;
    let inventory = server.inventory(InventoryRequest {
        session_id,
        include_system: Some(include_system),
        global: Some(global),
    });
    server.delete_session(session_id)?;
    render(format, &inventory?, print_text_output)
}

fn print_text_output(inventory: &InventoryResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Inventory at tick {} (snapshot tick {}, {})",
        inventory.tick, inventory.state.last_log_tick, inventory.state.time
    );
    if let Some(collections) = &inventory.collections {
        print_collections(&mut out, collections, "");
    }
    if let Some(databases) = &inventory.databases {
        for (name, database) in databases {
            let _ = writeln!(out, "{name}:");
            print_collections(&mut out, &database.collections, "  ");
        }
    }
    out
}

fn print_collections(out: &mut String, collections: &[CollectionDescriptor], indent: &str) {
    for c in collections {
        let _ = writeln!(
            out,
            "{indent}[{:>4}] {:20} {:8} created={}{}",
            c.id,
            c.name,
            c.kind,
            c.created_tick,
            if c.is_system { " system" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_server;

    #[test]
    fn text_hides_system_by_default() {
        let server = sample_server();
        let out = run(&server, "app", false, false, "text").unwrap();
        assert!(out.contains("users"));
        assert!(out.contains("follows"));
        assert!(!out.contains("_jobs"));
        assert!(server.registry().is_empty());
    }

    #[test]
    fn json_global() {
        let server = sample_server();
        let out = run(&server, "app", true, true, "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["databases"]["app"]["collections"].as_array().unwrap().len(), 3);
        assert_eq!(value["state"]["running"], true);
    }
}
