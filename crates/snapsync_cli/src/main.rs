//! snapsync CLI
//!
//! Runs the leader side of replication against a JSON fixture, for
//! inspecting what a follower would receive.
//!
//! # Commands
//!
//! - `inventory` - List collections with the session tick state
//! - `chunks` - Partition a collection into fingerprinted key chunks
//! - `fetch` - Fetch the keys or documents of one chunk
//! - `tail` - Read a window of the change log
//! - `dump` - Dump a whole collection

mod commands;
mod error;
mod fixture;

use clap::{Parser, Subcommand};
use error::{CliError, CliResult};
use snapsync_protocol::TailRequest;
use snapsync_server::{ReplicationServer, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// snapsync replication tools.
#[derive(Parser)]
#[command(name = "snapsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON fixture to load
    #[arg(global = true, short, long)]
    fixture: Option<PathBuf>,

    /// Database to operate on
    #[arg(global = true, short, long, default_value = "app")]
    database: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List collections with the session tick state
    Inventory {
        /// List every database
        #[arg(short, long)]
        global: bool,

        /// Include system collections
        #[arg(short = 's', long)]
        include_system: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Partition a collection into fingerprinted key chunks
    Chunks {
        /// Collection name
        collection: String,

        /// Keys per chunk
        #[arg(short, long)]
        chunk_size: Option<u64>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Fetch the keys or documents of one chunk
    Fetch {
        /// Collection name
        collection: String,

        /// Chunk index
        #[arg(short = 'n', long, default_value = "0")]
        chunk: u64,

        /// What to fetch (keys, docs)
        #[arg(short = 't', long = "type", default_value = "keys")]
        fetch_type: String,

        /// Keys per chunk and page
        #[arg(short, long)]
        chunk_size: Option<u64>,

        /// Resume from this key
        #[arg(short, long)]
        low: Option<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Read a window of the change log
    Tail {
        /// First tick (inclusive)
        #[arg(long)]
        from: Option<u64>,

        /// Last tick (inclusive)
        #[arg(long)]
        to: Option<u64>,

        /// Byte budget of the response
        #[arg(short, long)]
        chunk_size: Option<u64>,

        /// Only this collection
        #[arg(long)]
        collection: Option<String>,

        /// Skip system collections
        #[arg(long)]
        no_system: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Dump a whole collection
    Dump {
        /// Collection name
        collection: String,

        /// Byte budget per batch
        #[arg(short, long)]
        chunk_size: Option<u64>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("snapsync CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let output = run(cli)?;
    print!("{output}");
    Ok(())
}

fn run(cli: Cli) -> CliResult<String> {
    let path = cli
        .fixture
        .ok_or_else(|| CliError::Usage("fixture path required".into()))?;
    let engine = fixture::load(&path)?;
    let server = ReplicationServer::new(engine, ServerConfig::default().with_reaper(false));
    let database = cli.database.as_str();

    match cli.command {
        Commands::Inventory {
            global,
            include_system,
            format,
        } => commands::inventory::run(&server, database, global, include_system, &format),
        Commands::Chunks {
            collection,
            chunk_size,
            format,
        } => commands::chunks::run(&server, database, &collection, chunk_size, &format),
        Commands::Fetch {
            collection,
            chunk,
            fetch_type,
            chunk_size,
            low,
            format,
        } => commands::fetch::run(
            &server,
            database,
            commands::fetch::FetchArgs {
                collection: &collection,
                chunk,
                fetch_type: &fetch_type,
                chunk_size,
                low,
            },
            &format,
        ),
        Commands::Tail {
            from,
            to,
            chunk_size,
            collection,
            no_system,
            format,
        } => commands::tail::run(
            &server,
            TailRequest {
                database: database.to_string(),
                from,
                to,
                chunk_size,
                include_system: Some(!no_system),
                collection,
                server_id: None,
            },
            &format,
        ),
        Commands::Dump {
            collection,
            chunk_size,
            format,
        } => commands::dump::run(&server, database, &collection, chunk_size, &format),
        Commands::Version => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsync_testkit::{sample_fixture_json, TempFixture};

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("snapsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn runs_against_fixture() {
        let file = TempFixture::write(&sample_fixture_json());
        let path = file.path().to_str().unwrap();
        let out = run(cli(&["--fixture", path, "chunks", "users"])).unwrap();
        assert!(out.contains("3 keys"));

        let out = run(cli(&["-f", path, "fetch", "users", "--type", "docs", "--format", "json"]))
            .unwrap();
        assert!(out.contains("\"docs\""));
    }

    #[test]
    fn tail_flags() {
        let file = TempFixture::write(&sample_fixture_json());
        let path = file.path().to_str().unwrap();
        let out = run(cli(&["tail", "--fixture", path, "--from", "5", "--no-system"])).unwrap();
        assert!(out.starts_with("checkMore=false lastIncluded=8"));
    }

    #[test]
    fn fixture_required() {
        assert!(matches!(run(cli(&["dump", "users"])), Err(CliError::Usage(_))));
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
