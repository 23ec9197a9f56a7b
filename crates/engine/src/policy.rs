//! Compatibility policy
//!
//! Maps a persisted tag and a capability requirement to one of three
//! outcomes. The running build is described by an injected
//! [`EngineProfile`], never by process-wide constants, so the same logic can
//! be exercised against several hypothetical engine generations.
//!
//! `classify` is pure and total: every input pair yields exactly one outcome
//! and nothing falls through optimistically.

use strata_core::{
    CapabilityRequirement, FeatureBits, UnsupportedReason, VersionError, VersionResult,
    VersionTag,
};

/// What the running engine build can read and write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineProfile {
    /// Format generation this build speaks
    pub major: u32,
    /// Newest minor this build can write
    pub minor: u32,
    /// Minor given to newly created databases
    pub oldest_writable_minor: u32,
    /// Feature bits this build understands
    pub known_features: FeatureBits,
}

impl EngineProfile {
    /// Profile with no feature bits; new databases start at `minor`
    pub const fn new(major: u32, minor: u32) -> Self {
        EngineProfile {
            major,
            minor,
            oldest_writable_minor: minor,
            known_features: FeatureBits::EMPTY,
        }
    }

    /// Set the minor given to newly created databases
    pub const fn with_oldest_writable_minor(mut self, minor: u32) -> Self {
        self.oldest_writable_minor = minor;
        self
    }

    /// Set the feature bits this build understands
    pub const fn with_known_features(mut self, features: FeatureBits) -> Self {
        self.known_features = features;
        self
    }

    /// Tag written when a database is created
    pub const fn initial_tag(&self) -> VersionTag {
        VersionTag::new(self.major, self.oldest_writable_minor)
    }

    /// Newest tag this build can produce
    pub const fn newest_tag(&self) -> VersionTag {
        VersionTag::new(self.major, self.minor).with_features(self.known_features)
    }

    /// Check internal consistency
    pub fn validate(&self) -> VersionResult<()> {
        if self.oldest_writable_minor > self.minor {
            return Err(VersionError::Config(format!(
                "oldest writable minor {} is newer than engine minor {}",
                self.oldest_writable_minor, self.minor
            )));
        }
        Ok(())
    }
}

/// Result of classifying a tag against a requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Persisted tag already permits the capability
    Compatible,
    /// Upgrade to `target` first; `target` is the least tag >= current that satisfies the requirement
    RequiresUpgrade(VersionTag),
    /// This engine can never service the capability on this database
    Unsupported(UnsupportedReason),
}

/// Pure compatibility rules for one engine build
#[derive(Debug, Clone)]
pub struct CompatibilityPolicy {
    profile: EngineProfile,
}

impl CompatibilityPolicy {
    /// Create a policy for the given engine build
    pub fn new(profile: EngineProfile) -> Self {
        CompatibilityPolicy { profile }
    }

    /// Engine build this policy describes
    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    /// Classify `current` against a capability's requirement
    pub fn classify(
        &self,
        current: &VersionTag,
        requirement: &CapabilityRequirement,
    ) -> Classification {
        let required = &requirement.requires;

        if current.major != required.major {
            return Classification::Unsupported(UnsupportedReason::GenerationMismatch {
                current: current.major,
                required: required.major,
            });
        }
        if current.major != self.profile.major {
            return Classification::Unsupported(UnsupportedReason::GenerationMismatch {
                current: current.major,
                required: self.profile.major,
            });
        }

        let unknown = current.features.difference(self.profile.known_features);
        if !unknown.is_empty() {
            return Classification::Unsupported(UnsupportedReason::UnknownFeatureBits { unknown });
        }

        let newest = self.profile.newest_tag();
        if !newest.satisfies(required) {
            return Classification::Unsupported(UnsupportedReason::BeyondEngine {
                required: *required,
                engine: newest,
            });
        }

        if current.satisfies(required) {
            return Classification::Compatible;
        }

        match current.join(required) {
            Ok(target) => Classification::RequiresUpgrade(target),
            Err(_) => Classification::Unsupported(UnsupportedReason::GenerationMismatch {
                current: current.major,
                required: required.major,
            }),
        }
    }

    /// Decide whether this engine may open a database at `current` at all
    ///
    /// A higher minor than the engine's is accepted as long as every feature
    /// bit is known; unknown bits are refused rather than ignored.
    pub fn check_open(&self, current: &VersionTag) -> VersionResult<()> {
        if current.major != self.profile.major {
            return Err(VersionError::IncompatibleGeneration {
                current: current.major,
                required: self.profile.major,
            });
        }

        let unknown = current.features.difference(self.profile.known_features);
        if !unknown.is_empty() {
            return Err(VersionError::UnsupportedFeatureBits { unknown });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(b: u64) -> FeatureBits {
        FeatureBits::from_bits(b)
    }

    fn tag(major: u32, minor: u32, b: u64) -> VersionTag {
        VersionTag::new(major, minor).with_features(bits(b))
    }

    fn policy() -> CompatibilityPolicy {
        CompatibilityPolicy::new(
            EngineProfile::new(1, 6)
                .with_oldest_writable_minor(5)
                .with_known_features(bits(0b0111)),
        )
    }

    fn req(t: VersionTag) -> CapabilityRequirement {
        CapabilityRequirement::new("pluginKind=Z", t)
    }

    #[test]
    fn test_requires_upgrade_to_exact_target() {
        let result = policy().classify(&tag(1, 5, 0b0000), &req(tag(1, 6, 0b0010)));
        assert_eq!(result, Classification::RequiresUpgrade(tag(1, 6, 0b0010)));
    }

    #[test]
    fn test_classification_is_copy() {
        let p = policy();
        let refused = p.classify(&tag(2, 0, 0), &req(tag(1, 0, 0)));
        let copied = refused;
        assert_eq!(refused, copied);
        if let Classification::Unsupported(reason) = refused {
            let again = reason;
            assert_eq!(
                again,
                UnsupportedReason::GenerationMismatch {
                    current: 2,
                    required: 1
                }
            );
            assert_eq!(reason, again);
        } else {
            panic!("expected Unsupported, got {:?}", refused);
        }
    }

    #[test]
    fn test_target_is_join_of_current_and_requirement() {
        let current = tag(1, 6, 0b0100);
        let required = tag(1, 5, 0b0011);
        assert_eq!(
            policy().classify(&current, &req(required)),
            Classification::RequiresUpgrade(current.join(&required).unwrap())
        );
    }

    #[test]
    fn test_compatible_after_upgrade() {
        let result = policy().classify(&tag(1, 6, 0b0010), &req(tag(1, 6, 0b0010)));
        assert_eq!(result, Classification::Compatible);
    }

    #[test]
    fn test_target_never_clears_bits_or_lowers_minor() {
        // Current is ahead on minor and carries another bit; only the bit is added
        let result = policy().classify(&tag(1, 6, 0b0100), &req(tag(1, 5, 0b0001)));
        assert_eq!(result, Classification::RequiresUpgrade(tag(1, 6, 0b0101)));
    }

    #[test]
    fn test_generation_mismatch_in_both_directions() {
        let newer = EngineProfile::new(2, 0);
        let p = CompatibilityPolicy::new(newer);
        assert!(matches!(
            p.classify(&tag(2, 0, 0), &req(tag(1, 0, 0))),
            Classification::Unsupported(UnsupportedReason::GenerationMismatch {
                current: 2,
                required: 1
            })
        ));
        assert!(matches!(
            policy().classify(&tag(1, 0, 0), &req(tag(2, 0, 0))),
            Classification::Unsupported(UnsupportedReason::GenerationMismatch { .. })
        ));
    }

    #[test]
    fn test_database_from_other_generation_than_engine() {
        // Requirement and database agree, engine does not
        let result = policy().classify(&tag(2, 0, 0), &req(tag(2, 0, 0)));
        assert!(matches!(
            result,
            Classification::Unsupported(UnsupportedReason::GenerationMismatch {
                current: 2,
                required: 1
            })
        ));
    }

    #[test]
    fn test_unknown_bits_refused_even_when_satisfied() {
        let result = policy().classify(&tag(1, 6, 0b1010), &req(tag(1, 6, 0b0010)));
        assert_eq!(
            result,
            Classification::Unsupported(UnsupportedReason::UnknownFeatureBits {
                unknown: bits(0b1000)
            })
        );
    }

    #[test]
    fn test_requirement_beyond_engine() {
        let result = policy().classify(&tag(1, 5, 0), &req(tag(1, 7, 0)));
        assert!(matches!(
            result,
            Classification::Unsupported(UnsupportedReason::BeyondEngine { .. })
        ));

        let result = policy().classify(&tag(1, 5, 0), &req(tag(1, 5, 0b1000)));
        assert!(matches!(
            result,
            Classification::Unsupported(UnsupportedReason::BeyondEngine { .. })
        ));
    }

    #[test]
    fn test_classify_is_total_over_small_domain() {
        let p = policy();
        for cur_major in 0..3 {
            for cur_minor in 3..9 {
                for cur_bits in 0..16u64 {
                    for req_minor in 3..9 {
                        for req_bits in 0..16u64 {
                            let current = tag(cur_major, cur_minor, cur_bits);
                            let required = tag(1, req_minor, req_bits);
                            match p.classify(&current, &req(required)) {
                                Classification::Compatible => {
                                    assert!(current.satisfies(&required))
                                }
                                Classification::RequiresUpgrade(target) => {
                                    assert!(!current.satisfies(&required));
                                    assert!(target.satisfies(&required));
                                    assert!(current.is_monotone_step(&target).unwrap());
                                    assert!(p.profile().known_features.contains(target.features));
                                }
                                Classification::Unsupported(_) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_check_open() {
        let p = policy();
        assert!(p.check_open(&tag(1, 5, 0)).is_ok());
        // Newer minor with only known bits is readable
        assert!(p.check_open(&tag(1, 9, 0b0011)).is_ok());
        assert!(matches!(
            p.check_open(&tag(2, 0, 0)),
            Err(VersionError::IncompatibleGeneration {
                current: 2,
                required: 1
            })
        ));
        assert!(matches!(
            p.check_open(&tag(1, 6, 0b1_0000)),
            Err(VersionError::UnsupportedFeatureBits { .. })
        ));
    }

    #[test]
    fn test_profile_tags() {
        let profile = EngineProfile::new(1, 6)
            .with_oldest_writable_minor(5)
            .with_known_features(bits(0b11));
        assert_eq!(profile.initial_tag(), tag(1, 5, 0));
        assert_eq!(profile.newest_tag(), tag(1, 6, 0b11));
        assert!(profile.validate().is_ok());
        assert!(EngineProfile::new(1, 2)
            .with_oldest_writable_minor(3)
            .validate()
            .is_err());
    }
}
