//! # snapsync testkit
//!
//! Test utilities for snapsync.
//!
//! This crate provides:
//! - Populated in-memory engines and common scenarios
//! - Property-based test generators using proptest
//! - Temporary fixture files for command-line tests
//!
//! ## Usage
//!
//! ```rust
//! use snapsync_testkit::prelude::*;
//!
//! let fixture = populated_engine(10);
//! assert_eq!(fixture.engine.count(&fixture.database, &fixture.collection).unwrap(), 10);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
