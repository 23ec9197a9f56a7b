//! Format compatibility engine for Strata
//!
//! This crate decides when a database's persisted version tag must be raised
//! and performs the raise exactly once:
//! - Policy: classify a persisted tag against a capability requirement
//! - Registry: the static set of capabilities and what each needs
//! - Coordinator: lazy, race-free, crash-safe upgrades before first use
//! - Config: `compat.toml` describing the engine build and retry bounds
//!
//! The coordinator is the only component that writes tags; it goes through
//! a [`strata_storage::DatabaseVersionStore`] so durability stays a storage
//! concern.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod policy;
pub mod retry;

pub use capabilities::{CapabilityRegistry, CapabilityRegistryBuilder};
pub use config::{CompatConfig, CONFIG_FILE_NAME};
pub use coordinator::{Ensured, StartupReport, UpgradeCoordinator};
pub use policy::{Classification, CompatibilityPolicy, EngineProfile};
pub use retry::RetryConfig;
