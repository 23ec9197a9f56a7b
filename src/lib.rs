//! Strata format compatibility
//!
//! Every Strata database persists a version tag: a major generation, an
//! additive minor and a set of feature bits. Capabilities that write
//! artifacts only newer readers understand declare the tag they need, and
//! the tag is raised lazily, exactly once, before the first such artifact.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_compat::{CompatConfig, DatabaseName, FileVersionStore};
//!
//! let config = CompatConfig::from_file(&root.join("compat.toml"))?;
//! let store = Arc::new(FileVersionStore::open(&root)?);
//! let coordinator = config.build_coordinator(store)?;
//!
//! let db = DatabaseName::new("orders")?;
//! coordinator.with_capability(&db, "index.plugin.2dsphere", |_tag| {
//!     build_index(&db)
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: tags, feature bits, requirements, errors
//! - `strata-storage`: the VERSION record and version stores
//! - `strata-engine`: policy, registry, coordinator, configuration

pub use strata_core::{
    CapabilityRequirement, DatabaseName, FeatureBits, UnsupportedReason, VersionError,
    VersionResult, VersionTag,
};
pub use strata_engine::{
    CapabilityRegistry, Classification, CompatConfig, CompatibilityPolicy, EngineProfile,
    Ensured, RetryConfig, StartupReport, UpgradeCoordinator, CONFIG_FILE_NAME,
};
pub use strata_storage::{
    CasOutcome, DatabaseVersionStore, FileVersionStore, MemoryVersionStore,
};
