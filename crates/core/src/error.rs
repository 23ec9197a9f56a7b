//! Error types for format versioning
//!
//! This module defines the error taxonomy shared by the store and the
//! upgrade coordinator. We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.
//!
//! ## Fatal vs transient
//!
//! - Fatal errors mean the running engine cannot service the database (or the
//!   capability) at all. They are never retried and never downgraded.
//! - Transient errors come from contention. The coordinator retries them
//!   internally and only surfaces `ContentionExhausted` once its bound is hit.

use std::io;
use thiserror::Error;

use crate::database_name::DatabaseNameError;
use crate::features::FeatureBits;
use crate::version::VersionTag;

/// Result type alias for versioning operations
pub type VersionResult<T> = std::result::Result<T, VersionError>;

/// Why a capability can never be serviced for a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnsupportedReason {
    /// Database, requirement, or engine disagree on the format generation
    #[error("format generation mismatch: database is v{current}, requirement is v{required}")]
    GenerationMismatch {
        /// Major of the persisted tag
        current: u32,
        /// Major of the requirement or engine
        required: u32,
    },

    /// Database carries feature bits this engine build does not recognize
    #[error("database carries unknown feature bits {unknown}")]
    UnknownFeatureBits {
        /// Bits outside the engine's known set
        unknown: FeatureBits,
    },

    /// Requirement asks for a version this engine build cannot write
    #[error("requirement {required} is beyond what this engine writes ({engine})")]
    BeyondEngine {
        /// Requested tag
        required: VersionTag,
        /// Newest tag the engine can write
        engine: VersionTag,
    },
}

/// Error types for format versioning
#[derive(Debug, Error)]
pub enum VersionError {
    /// Major version mismatch: refuse to open or operate on the database
    #[error("incompatible format generation: found v{current}, expected v{required}")]
    IncompatibleGeneration {
        /// Major found on disk (or on the left-hand tag)
        current: u32,
        /// Major expected
        required: u32,
    },

    /// Unknown feature bits present: refuse rather than reinterpret them
    #[error("unsupported feature bits {unknown}")]
    UnsupportedFeatureBits {
        /// Bits the engine does not recognize
        unknown: FeatureBits,
    },

    /// Capability can never be serviced for this database by this engine
    #[error("capability '{capability}' unsupported: {reason}")]
    Unsupported {
        /// Capability name
        capability: String,
        /// Classification detail
        reason: UnsupportedReason,
    },

    /// Upgrade kept losing races until the retry bound was exhausted
    #[error("upgrade contention on database '{database}' not resolved after {attempts} attempts")]
    ContentionExhausted {
        /// Database name
        database: String,
        /// Attempts made
        attempts: u32,
    },

    /// Capability name not present in the registry
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    /// Database has no version entry
    #[error("database '{0}' not found")]
    DatabaseNotFound(String),

    /// Database already has a version entry
    #[error("database '{0}' already exists")]
    AlreadyExists(String),

    /// Write would lower the persisted minor or clear a feature bit
    #[error("version regression refused: {current} -> {target}")]
    Regression {
        /// Committed tag
        current: VersionTag,
        /// Rejected target
        target: VersionTag,
    },

    /// Persisted version record is damaged
    #[error("corrupt version record: {0}")]
    Corruption(String),

    /// Invalid database name
    #[error("invalid database name: {0}")]
    InvalidName(#[from] DatabaseNameError),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VersionError {
    /// True when the engine cannot service the database or capability at all
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VersionError::IncompatibleGeneration { .. }
                | VersionError::UnsupportedFeatureBits { .. }
                | VersionError::Unsupported { .. }
                | VersionError::Regression { .. }
                | VersionError::Corruption(_)
        )
    }

    /// True when the failure came from contention and a later call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, VersionError::ContentionExhausted { .. })
    }
}
