//! On-disk byte formats for version metadata.
//!
//! Keeping serialization separate from operational logic (how records are
//! committed) makes format evolution easier to manage.
//!
//! # Module Structure
//!
//! - `version_record`: per-database VERSION record

pub mod version_record;

pub use version_record::{
    RecordError, VersionRecord, SUPPORTED_RECORD_MAJOR, VERSION_RECORD_MAGIC,
    VERSION_RECORD_SIZE,
};
