//! Storage layer for Strata format versioning
//!
//! This crate persists the per-database `VersionTag`:
//! - VersionRecord: fixed-size, checksummed VERSION record (layout keyed by major)
//! - DatabaseVersionStore: read + compare-and-upgrade contract
//! - FileVersionStore: one VERSION file per database directory, atomic commits
//! - MemoryVersionStore: ephemeral store with the same semantics
//! - testing: crash injection inside the commit sequence

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod store;
pub mod testing;

pub use format::{RecordError, VersionRecord, VERSION_RECORD_SIZE};
pub use store::{
    CasOutcome, DatabaseVersionStore, FileVersionStore, MemoryVersionStore, VERSION_FILE_NAME,
};
