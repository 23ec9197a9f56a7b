//! Core types for Strata format versioning
//!
//! This crate defines the foundational types shared by the store and the
//! engine:
//! - VersionTag: major / minor / feature-bit tag of a database's on-disk image
//! - FeatureBits: fixed-width feature bitmask
//! - CapabilityRequirement: minimal tag a capability needs before it writes
//! - DatabaseName: validated identifier of a versioned database
//! - VersionError: error taxonomy (fatal vs transient)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod database_name;
pub mod error;
pub mod features;
pub mod version;

pub use capability::CapabilityRequirement;
pub use database_name::{DatabaseName, DatabaseNameError, MAX_DATABASE_NAME_LENGTH};
pub use error::{UnsupportedReason, VersionError, VersionResult};
pub use features::{FeatureBits, MAX_FEATURE_BITS};
pub use version::VersionTag;
