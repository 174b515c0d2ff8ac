//! # snapsync server
//!
//! Leader-side replication request handler.
//!
//! This crate provides:
//! - Session endpoints (create, renew, delete)
//! - Inventory, key binding, chunk listing and chunk fetching
//! - Change-log tailing and collection dumps
//! - Barrier and remove-keys acknowledgments
//! - Log retention bounded by follower progress
//!
//! # Architecture
//!
//! [`ReplicationServer`] is the composition root. It owns the storage
//! engine handle, the session registry, the follower table and the
//! background reaper. Handlers validate and default request parameters,
//! borrow the session they need through the registry, and map failures to
//! [`ServerError`] with an HTTP-style status code:
//!
//! | Error | Status |
//! |---|---|
//! | invalid argument | 400 |
//! | unknown session, collection or chunk | 404 |
//! | session busy | 409 |
//! | engine failure | 500 |
//!
//! Transport is left to the embedding process.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::ReplicationServer;
