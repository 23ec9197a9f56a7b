//! Capability registry
//!
//! Collaborators that implement concrete features (index plugins, alternate
//! storage structures, ...) register their requirement once at startup. The
//! registry is frozen after `build()` and only read afterwards.

use std::collections::BTreeMap;
use strata_core::{CapabilityRequirement, VersionError, VersionResult};

use crate::policy::EngineProfile;

/// Read-only map from capability name to requirement
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    by_name: BTreeMap<String, CapabilityRequirement>,
}

impl CapabilityRegistry {
    /// Start building a registry for the given engine build
    pub fn builder(profile: EngineProfile) -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder {
            profile,
            by_name: BTreeMap::new(),
        }
    }

    /// Look up a capability
    pub fn get(&self, name: &str) -> Option<&CapabilityRequirement> {
        self.by_name.get(name)
    }

    /// Look up a capability, failing on unknown names
    pub fn require(&self, name: &str) -> VersionResult<&CapabilityRequirement> {
        self.get(name)
            .ok_or_else(|| VersionError::UnknownCapability(name.to_string()))
    }

    /// Registered requirements, by name
    pub fn iter(&self) -> impl Iterator<Item = &CapabilityRequirement> {
        self.by_name.values()
    }

    /// Number of registered capabilities
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Collects requirements and validates them against the engine build
#[derive(Debug)]
pub struct CapabilityRegistryBuilder {
    profile: EngineProfile,
    by_name: BTreeMap<String, CapabilityRequirement>,
}

impl CapabilityRegistryBuilder {
    /// Register a capability
    ///
    /// # Errors
    ///
    /// `Config` when the name is taken or the requirement is something this
    /// build cannot write.
    pub fn register(mut self, requirement: CapabilityRequirement) -> VersionResult<Self> {
        if requirement.name.is_empty() {
            return Err(VersionError::Config(
                "capability name cannot be empty".to_string(),
            ));
        }
        if self.by_name.contains_key(&requirement.name) {
            return Err(VersionError::Config(format!(
                "capability '{}' registered twice",
                requirement.name
            )));
        }

        let newest = self.profile.newest_tag();
        if !newest.satisfies(&requirement.requires) {
            return Err(VersionError::Config(format!(
                "capability '{}' requires {}, engine writes at most {}",
                requirement.name, requirement.requires, newest
            )));
        }

        self.by_name.insert(requirement.name.clone(), requirement);
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            by_name: self.by_name,
        }
    }
}
