//! Upgrade coordinator for lazy format upgrades
//!
//! Raises a database's persisted tag the first time a capability that needs
//! it is used, and only then lets the caller write the capability's artifacts.
//!
//! Per request the coordinator walks this state machine:
//!
//! ```text
//! Start -> CheckPolicy -> Proceed
//!                      -> AcquireUpgradeSection -> (re-read) -> CompareAndUpgrade
//!                             -> Committed -> CheckPolicy -> Proceed
//!                             -> Stale / section timeout -> backoff -> CheckPolicy
//! ```
//!
//! - `Proceed` is reached only under `Compatible`.
//! - The upgrade section is a per-database mutex acquired with a bounded wait
//!   and released by RAII on every exit path. It covers the metadata write
//!   only, never the caller's feature work.
//! - Retries are bounded by [`RetryConfig`]; exhaustion is reported as
//!   `ContentionExhausted`, distinct from fatal `Unsupported` outcomes.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use strata_core::{
    CapabilityRequirement, DatabaseName, VersionError, VersionResult, VersionTag,
};
use strata_storage::{CasOutcome, DatabaseVersionStore};
use tracing::{debug, info, warn};

use crate::capabilities::CapabilityRegistry;
use crate::policy::{Classification, CompatibilityPolicy};
use crate::retry::RetryConfig;

/// Requirement name used for eager upgrades to the engine's own minor
const ENGINE_UPGRADE: &str = "engine.upgrade";

/// How an ensure request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// Tag already permitted the capability; nothing was written
    AlreadyCompatible(VersionTag),
    /// This call committed an upgrade
    Upgraded {
        /// Tag before the upgrade
        from: VersionTag,
        /// Tag after the upgrade
        to: VersionTag,
    },
}

impl Ensured {
    /// Tag the capability proceeds under
    pub fn tag(&self) -> VersionTag {
        match self {
            Ensured::AlreadyCompatible(tag) => *tag,
            Ensured::Upgraded { to, .. } => *to,
        }
    }

    /// True when this call wrote a new tag
    pub fn upgraded(&self) -> bool {
        matches!(self, Ensured::Upgraded { .. })
    }
}

/// One pass through the upgrade section
enum SectionStep {
    /// This call committed; carries the tag it replaced
    Committed(VersionTag),
    /// Another writer had already upgraded by the time we got the section
    Resolved,
    /// Lost a race or timed out waiting; back off and re-check
    Contended,
}

/// Result of checking every database at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Databases that passed the open check, with their tag after startup
    pub checked: Vec<(DatabaseName, VersionTag)>,
    /// Databases whose minor was raised to the engine's
    pub upgraded: Vec<DatabaseName>,
}

/// Coordinates lazy upgrades for all databases of one store
pub struct UpgradeCoordinator {
    store: Arc<dyn DatabaseVersionStore>,
    policy: CompatibilityPolicy,
    registry: Arc<CapabilityRegistry>,
    retry: RetryConfig,
    /// Per-database upgrade sections
    sections: DashMap<DatabaseName, Arc<Mutex<()>>>,
}

impl UpgradeCoordinator {
    /// Create a coordinator with default retry behavior
    pub fn new(
        store: Arc<dyn DatabaseVersionStore>,
        policy: CompatibilityPolicy,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        UpgradeCoordinator {
            store,
            policy,
            registry,
            retry: RetryConfig::default(),
            sections: DashMap::new(),
        }
    }

    /// Replace the retry configuration
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn DatabaseVersionStore> {
        &self.store
    }

    /// Policy in use
    pub fn policy(&self) -> &CompatibilityPolicy {
        &self.policy
    }

    /// Registered capabilities
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Create a database at the oldest tag this engine still writes
    pub fn create_database(&self, db: &DatabaseName) -> VersionResult<VersionTag> {
        let initial = self.policy.profile().initial_tag();
        let tag = self.store.create(db, initial)?;
        info!(target: "strata::compat", database = %db, tag = %tag, "Database created");
        Ok(tag)
    }

    /// Refuse databases this engine cannot safely interpret
    pub fn check_open(&self, db: &DatabaseName) -> VersionResult<VersionTag> {
        let current = self.store.read(db)?;
        if let Err(e) = self.policy.check_open(&current) {
            warn!(target: "strata::compat", database = %db, tag = %current, error = %e, "Refusing to open database");
            return Err(e);
        }
        Ok(current)
    }

    /// Make sure `capability` may write its artifacts to `db`
    ///
    /// Safe to call on every use of the capability: once the tag satisfies
    /// the requirement no further writes happen.
    pub fn ensure_capability(&self, db: &DatabaseName, capability: &str) -> VersionResult<()> {
        let requirement = self.registry.require(capability)?.clone();
        self.ensure_requirement(db, &requirement).map(|_| ())
    }

    /// Run `write_artifacts` only after `capability` is durably permitted
    ///
    /// The closure receives the tag it runs under. If the upgrade fails the
    /// closure never runs.
    pub fn with_capability<T, E, F>(
        &self,
        db: &DatabaseName,
        capability: &str,
        write_artifacts: F,
    ) -> Result<T, E>
    where
        F: FnOnce(VersionTag) -> Result<T, E>,
        E: From<VersionError>,
    {
        let requirement = self.registry.require(capability)?.clone();
        let ensured = self.ensure_requirement(db, &requirement)?;
        write_artifacts(ensured.tag())
    }

    /// Drive the upgrade state machine for an explicit requirement
    pub fn ensure_requirement(
        &self,
        db: &DatabaseName,
        requirement: &CapabilityRequirement,
    ) -> VersionResult<Ensured> {
        let mut upgraded_from: Option<VersionTag> = None;
        let mut attempts = 0u32;

        loop {
            let current = self.store.read(db)?;

            match self.policy.classify(&current, requirement) {
                Classification::Compatible => {
                    return Ok(match upgraded_from {
                        Some(from) => Ensured::Upgraded { from, to: current },
                        None => Ensured::AlreadyCompatible(current),
                    });
                }
                Classification::Unsupported(reason) => {
                    warn!(
                        target: "strata::compat",
                        database = %db,
                        capability = %requirement.name,
                        tag = %current,
                        reason = %reason,
                        "Capability unsupported"
                    );
                    return Err(VersionError::Unsupported {
                        capability: requirement.name.clone(),
                        reason,
                    });
                }
                Classification::RequiresUpgrade(_) => {}
            }

            if attempts >= self.retry.max_attempts() {
                warn!(target: "strata::compat", database = %db, attempts, "Upgrade contention exhausted");
                return Err(VersionError::ContentionExhausted {
                    database: db.to_string(),
                    attempts,
                });
            }
            attempts += 1;

            match self.upgrade_in_section(db, requirement)? {
                SectionStep::Committed(from) => {
                    upgraded_from.get_or_insert(from);
                }
                SectionStep::Resolved => {}
                SectionStep::Contended => {
                    let delay = self.retry.backoff(attempts - 1);
                    debug!(target: "strata::compat", database = %db, attempt = attempts, ?delay, "Upgrade contended, backing off");
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Eagerly raise `db` to this engine's minor (feature bits untouched)
    pub fn upgrade_to_engine(&self, db: &DatabaseName) -> VersionResult<Ensured> {
        let profile = self.policy.profile();
        let requirement =
            CapabilityRequirement::new(ENGINE_UPGRADE, VersionTag::new(profile.major, profile.minor));
        self.ensure_requirement(db, &requirement)
    }

    /// Check every database in the store, optionally upgrading each one
    ///
    /// Stops at the first database this engine cannot open.
    pub fn startup_check(&self, upgrade: bool) -> VersionResult<StartupReport> {
        let mut report = StartupReport::default();

        for db in self.store.list()? {
            let mut tag = self.check_open(&db)?;
            if upgrade && tag.minor < self.policy.profile().minor {
                info!(
                    target: "strata::compat",
                    database = %db,
                    from = %tag,
                    to_minor = self.policy.profile().minor,
                    "Upgrading database at startup"
                );
                let ensured = self.upgrade_to_engine(&db)?;
                if ensured.upgraded() {
                    report.upgraded.push(db.clone());
                }
                tag = ensured.tag();
            }
            report.checked.push((db, tag));
        }

        debug!(
            target: "strata::compat",
            checked = report.checked.len(),
            upgraded = report.upgraded.len(),
            "Startup version check complete"
        );
        Ok(report)
    }

    fn section(&self, db: &DatabaseName) -> Arc<Mutex<()>> {
        self.sections
            .entry(db.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// AcquireUpgradeSection -> re-check -> CompareAndUpgrade
    fn upgrade_in_section(
        &self,
        db: &DatabaseName,
        requirement: &CapabilityRequirement,
    ) -> VersionResult<SectionStep> {
        let section = self.section(db);
        let Some(_guard) = section.try_lock_for(self.retry.section_timeout()) else {
            return Ok(SectionStep::Contended);
        };

        // Someone may have upgraded while we waited
        let current = self.store.read(db)?;
        let target = match self.policy.classify(&current, requirement) {
            Classification::RequiresUpgrade(target) => target,
            // Compatible now, or fatal: the outer loop re-classifies and reports
            Classification::Compatible | Classification::Unsupported(_) => {
                return Ok(SectionStep::Resolved)
            }
        };

        match self.store.compare_and_upgrade(db, &current, &target)? {
            CasOutcome::Committed { tag, generation } => {
                info!(
                    target: "strata::compat",
                    database = %db,
                    capability = %requirement.name,
                    from = %current,
                    to = %tag,
                    generation,
                    "Database format upgraded"
                );
                Ok(SectionStep::Committed(current))
            }
            CasOutcome::Stale { current: newer } => {
                debug!(target: "strata::compat", database = %db, expected = %current, found = %newer, "Stale version on upgrade");
                Ok(SectionStep::Contended)
            }
        }
    }
}
