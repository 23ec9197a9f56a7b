//! Capability requirements
//!
//! A capability is anything that writes on-disk artifacts only newer readers
//! understand (an index plugin kind, an alternate free-space structure, ...).
//! Each one declares the minimal tag that must already be persisted before
//! its first artifact may be written.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::FeatureBits;
use crate::version::VersionTag;

/// Minimal persisted version a capability needs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityRequirement {
    /// Capability name, e.g. `"index.plugin.2dsphere"`
    pub name: String,
    /// Tag that must be satisfied before the capability writes anything
    pub requires: VersionTag,
}

impl CapabilityRequirement {
    /// Create a requirement
    pub fn new(name: impl Into<String>, requires: VersionTag) -> Self {
        CapabilityRequirement {
            name: name.into(),
            requires,
        }
    }

    /// Requirement on a minor version plus a set of feature bits
    pub fn minor_and_features(
        name: impl Into<String>,
        major: u32,
        minor: u32,
        features: FeatureBits,
    ) -> Self {
        Self::new(name, VersionTag::new(major, minor).with_features(features))
    }
}

impl fmt::Display for CapabilityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (requires {})", self.name, self.requires)
    }
}
