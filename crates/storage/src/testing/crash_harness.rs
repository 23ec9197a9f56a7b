//! Crash harness for VERSION record writes
//!
//! Provides crash injection points inside the write-fsync-rename sequence of
//! the file store, so tests can stop a commit halfway and reopen the store
//! from whatever reached the disk.
//!
//! # Crash Points
//!
//! - Before the temp record is written
//! - After the temp record is synced, before the rename
//! - After the rename, before the directory sync
//!
//! # Example
//!
//! ```ignore
//! use strata_storage::testing::{CrashInjector, CrashPoint};
//!
//! let injector = CrashInjector::new();
//! let store = FileVersionStore::open(root)?.with_crash_injector(injector.clone());
//! injector.arm(CrashPoint::BeforeRename);
//! assert!(store.compare_and_upgrade(&db, &old, &new).is_err());
//! ```

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// Crash injection points in a VERSION record commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// Before anything is written
    BeforeTempWrite,
    /// Temp record written and synced, not yet renamed over VERSION
    BeforeRename,
    /// Rename done, parent directory not yet synced
    AfterRename,
}

impl CrashPoint {
    /// Get all crash points
    pub fn all() -> Vec<CrashPoint> {
        vec![
            CrashPoint::BeforeTempWrite,
            CrashPoint::BeforeRename,
            CrashPoint::AfterRename,
        ]
    }

    /// Get description of crash point
    pub fn description(&self) -> &'static str {
        match self {
            CrashPoint::BeforeTempWrite => "Before temp VERSION write",
            CrashPoint::BeforeRename => "After temp fsync, before atomic rename",
            CrashPoint::AfterRename => "After atomic rename, before directory fsync",
        }
    }

    /// Expected committed tag after reopening from a crash at this point
    pub fn expected_state(&self) -> UpgradeState {
        match self {
            CrashPoint::BeforeTempWrite => UpgradeState::NotUpgraded,
            CrashPoint::BeforeRename => UpgradeState::NotUpgraded,
            CrashPoint::AfterRename => UpgradeState::Upgraded,
        }
    }
}

/// Expected committed state after recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// Old record still in place
    NotUpgraded,
    /// New record visible
    Upgraded,
}

/// One-shot crash trigger shared between a test and a store
#[derive(Debug, Clone, Default)]
pub struct CrashInjector {
    armed: Arc<Mutex<Option<CrashPoint>>>,
}

impl CrashInjector {
    /// Create a disarmed injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Crash the next time `point` is reached
    pub fn arm(&self, point: CrashPoint) {
        *self.armed.lock() = Some(point);
    }

    /// Cancel a pending crash
    pub fn disarm(&self) {
        *self.armed.lock() = None;
    }

    /// Currently armed point, if any
    pub fn armed(&self) -> Option<CrashPoint> {
        *self.armed.lock()
    }

    /// Called by the store at each injection point
    ///
    /// Fires at most once per `arm`.
    pub fn check(&self, point: CrashPoint) -> io::Result<()> {
        let mut armed = self.armed.lock();
        if *armed == Some(point) {
            *armed = None;
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated crash: {}", point.description()),
            ));
        }
        Ok(())
    }
}
