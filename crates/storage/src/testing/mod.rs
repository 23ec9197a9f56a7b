//! Testing utilities for VERSION record durability
//!
//! - **Crash Harness**: one-shot crash injection inside the record commit
//!   sequence, used to check that a reopened store sees either the old or the
//!   new tag and never a mix.

mod crash_harness;

pub use crash_harness::{CrashInjector, CrashPoint, UpgradeState};
