//! Compatibility configuration via `compat.toml`
//!
//! Describes the running engine build, the upgrade retry bounds, and the
//! capabilities feature collaborators register. On first start a default
//! `compat.toml` can be written next to the data; edit it and restart to
//! change settings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use strata_core::{
    CapabilityRequirement, FeatureBits, VersionError, VersionResult, VersionTag,
};
use strata_storage::DatabaseVersionStore;

use crate::capabilities::CapabilityRegistry;
use crate::coordinator::UpgradeCoordinator;
use crate::policy::{CompatibilityPolicy, EngineProfile};
use crate::retry::RetryConfig;

/// Config file name placed in the store root.
pub const CONFIG_FILE_NAME: &str = "compat.toml";

/// `[engine]` section: the format this build reads and writes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSection {
    /// Format generation
    pub major: u32,
    /// Newest minor this build writes
    pub minor: u32,
    /// Minor given to new databases (defaults to `minor`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_writable_minor: Option<u32>,
    /// Bit positions of the features this build understands
    #[serde(default)]
    pub known_features: Vec<u32>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 0,
            oldest_writable_minor: None,
            known_features: Vec::new(),
        }
    }
}

/// `[retry]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySection {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upgrade section wait bound in milliseconds
    #[serde(default = "default_section_timeout_ms")]
    pub section_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryConfig::default().base_delay_ms
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::default().max_delay_ms
}

fn default_section_timeout_ms() -> u64 {
    RetryConfig::default().section_timeout_ms
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            section_timeout_ms: default_section_timeout_ms(),
        }
    }
}

/// One `[[capability]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilitySection {
    /// Capability name
    pub name: String,
    /// Minimal minor
    pub minor: u32,
    /// Bit positions that must be set
    #[serde(default)]
    pub features: Vec<u32>,
}

/// Configuration loaded from `compat.toml`.
///
/// # Example
///
/// ```toml
/// upgrade_on_startup = false
///
/// [engine]
/// major = 1
/// minor = 6
/// oldest_writable_minor = 5
/// known_features = [1]
///
/// [[capability]]
/// name = "index.plugin.2dsphere"
/// minor = 6
/// features = [1]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompatConfig {
    /// Raise every database to the engine's minor when the store starts
    #[serde(default)]
    pub upgrade_on_startup: bool,
    /// Engine build description
    #[serde(default)]
    pub engine: EngineSection,
    /// Retry bounds
    #[serde(default)]
    pub retry: RetrySection,
    /// Registered capabilities
    #[serde(default, rename = "capability")]
    pub capabilities: Vec<CapabilitySection>,
}

fn features_from_positions(positions: &[u32]) -> VersionResult<FeatureBits> {
    positions.iter().try_fold(FeatureBits::EMPTY, |acc, &p| {
        FeatureBits::bit(p)
            .map(|bit| acc.union(bit))
            .ok_or_else(|| VersionError::Config(format!("feature bit {} out of range", p)))
    })
}

impl CompatConfig {
    /// Engine profile described by `[engine]`
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range bits or an oldest minor above `minor`.
    pub fn profile(&self) -> VersionResult<EngineProfile> {
        let engine = &self.engine;
        let profile = EngineProfile::new(engine.major, engine.minor)
            .with_oldest_writable_minor(engine.oldest_writable_minor.unwrap_or(engine.minor))
            .with_known_features(features_from_positions(&engine.known_features)?);
        profile.validate()?;
        Ok(profile)
    }

    /// Retry configuration described by `[retry]`
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay_ms: self.retry.base_delay_ms,
            max_delay_ms: self.retry.max_delay_ms,
            section_timeout_ms: self.retry.section_timeout_ms,
        }
    }

    /// Registry built from the `[[capability]]` entries
    pub fn registry(&self, profile: EngineProfile) -> VersionResult<CapabilityRegistry> {
        let mut builder = CapabilityRegistry::builder(profile);
        for cap in &self.capabilities {
            let requires = VersionTag::new(profile.major, cap.minor)
                .with_features(features_from_positions(&cap.features)?);
            builder = builder.register(CapabilityRequirement::new(cap.name.clone(), requires))?;
        }
        Ok(builder.build())
    }

    /// Build a coordinator over `store` from this config
    pub fn build_coordinator(
        &self,
        store: Arc<dyn DatabaseVersionStore>,
    ) -> VersionResult<UpgradeCoordinator> {
        let profile = self.profile()?;
        let registry = self.registry(profile)?;
        Ok(UpgradeCoordinator::new(
            store,
            CompatibilityPolicy::new(profile),
            Arc::new(registry),
        )
        .with_retry_config(self.retry_config()))
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Strata format compatibility configuration
#
# Raise every database to the engine's minor version at startup
# (default: false, databases are upgraded lazily on first use of a feature).
upgrade_on_startup = false

# On-disk format this engine build reads and writes.
[engine]
major = 1
minor = 0
# oldest_writable_minor = 0    # minor given to new databases, default = minor
known_features = []            # bit positions this build understands

# Bounded retry of contended upgrades.
[retry]
max_retries = 8
base_delay_ms = 1
max_delay_ms = 50
section_timeout_ms = 2000

# Capabilities that need a newer format before writing artifacts.
# [[capability]]
# name = "index.plugin.2dsphere"
# minor = 1
# features = [1]
"#
    }

    /// Parse config from a TOML string and validate it.
    pub fn from_toml_str(content: &str) -> VersionResult<Self> {
        let config: CompatConfig = toml::from_str(content)
            .map_err(|e| VersionError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> VersionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VersionError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            VersionError::Config(msg) => {
                VersionError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> VersionResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                VersionError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> VersionResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VersionError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            VersionError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Check that the profile and every capability are consistent
    pub fn validate(&self) -> VersionResult<()> {
        let profile = self.profile()?;
        self.registry(profile)?;
        Ok(())
    }
}
