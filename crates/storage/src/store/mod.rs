//! Per-database version store
//!
//! Holds the last durably committed `VersionTag` of each database and exposes
//! a single mutation: compare-and-upgrade. Ordinary read/write traffic never
//! touches it.
//!
//! ## Invariants
//!
//! - Readers only ever observe committed tags
//! - A committed tag never regresses on either axis
//! - `Committed` is returned only after the new tag is durable

use strata_core::{DatabaseName, VersionError, VersionResult, VersionTag};

mod file;
mod memory;

pub use file::{FileVersionStore, VERSION_FILE_NAME};
pub use memory::MemoryVersionStore;

/// Outcome of a compare-and-upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Target is now the committed tag
    Committed {
        /// Committed tag
        tag: VersionTag,
        /// Generation of the committed record
        generation: u64,
    },
    /// Committed tag no longer matched `expected`; re-read and retry
    Stale {
        /// Tag committed at the time of the attempt
        current: VersionTag,
    },
}

impl CasOutcome {
    /// True for `Committed`
    pub fn is_committed(&self) -> bool {
        matches!(self, CasOutcome::Committed { .. })
    }
}

/// Durable holder of one `VersionTag` per database
///
/// Implementations must make `compare_and_upgrade` a single atomic, durable
/// step: no caller ever sees a partially written tag.
pub trait DatabaseVersionStore: Send + Sync {
    /// Create the entry for a new database
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when the database already has an entry.
    fn create(&self, db: &DatabaseName, initial: VersionTag) -> VersionResult<VersionTag>;

    /// Last durably committed tag
    fn read(&self, db: &DatabaseName) -> VersionResult<VersionTag>;

    /// Persist `target` iff the committed tag equals `expected`
    ///
    /// A target equal to `expected` is a no-op that reports `Committed`
    /// without writing.
    ///
    /// # Errors
    ///
    /// `Regression` when `target` would lower an axis of `expected`,
    /// `IncompatibleGeneration` when the majors differ.
    fn compare_and_upgrade(
        &self,
        db: &DatabaseName,
        expected: &VersionTag,
        target: &VersionTag,
    ) -> VersionResult<CasOutcome>;

    /// Number of committed upgrades since creation
    fn generation(&self, db: &DatabaseName) -> VersionResult<u64>;

    /// True when the database has an entry
    fn exists(&self, db: &DatabaseName) -> VersionResult<bool>;

    /// All databases with an entry, sorted by name
    fn list(&self) -> VersionResult<Vec<DatabaseName>>;
}

/// Reject targets that would move the committed tag backwards
pub(crate) fn validate_step(current: &VersionTag, target: &VersionTag) -> VersionResult<()> {
    if !current.is_monotone_step(target)? {
        return Err(VersionError::Regression {
            current: *current,
            target: *target,
        });
    }
    Ok(())
}
