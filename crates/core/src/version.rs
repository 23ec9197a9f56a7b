//! On-disk format version tag
//!
//! A `VersionTag` carries two independent compatibility axes inside one
//! format generation:
//!
//! - **minor**: ordered, additive feature generations
//! - **features**: independently togglable feature bits
//!
//! ## Comparison
//!
//! Tags are comparable only within the same `major`. There is deliberately no
//! `PartialOrd` impl: use [`VersionTag::try_cmp`], which reports a cross-major
//! comparison as `IncompatibleGeneration` instead of picking an answer.
//!
//! Within one major the order is a product order: a tag is greater only when
//! it is at least as large on *both* axes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{VersionError, VersionResult};
use crate::features::FeatureBits;

/// Version of a database's on-disk image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag {
    /// Format generation. Mismatch is never compatible.
    pub major: u32,
    /// Additive feature generation within `major`
    pub minor: u32,
    /// Independently togglable on-disk features
    #[serde(default)]
    pub features: FeatureBits,
}

impl VersionTag {
    /// Tag with no feature bits
    pub const fn new(major: u32, minor: u32) -> Self {
        VersionTag {
            major,
            minor,
            features: FeatureBits::EMPTY,
        }
    }

    /// Same tag with `features` replaced
    pub const fn with_features(self, features: FeatureBits) -> Self {
        VersionTag {
            major: self.major,
            minor: self.minor,
            features,
        }
    }

    /// True iff a database at `self` already permits everything `required` needs
    ///
    /// Same major, minor at least as high, and a superset of the required bits.
    pub fn satisfies(&self, required: &VersionTag) -> bool {
        self.major == required.major
            && self.minor >= required.minor
            && self.features.contains(required.features)
    }

    /// Compare two tags of the same generation
    ///
    /// Returns `Ok(None)` when the axes disagree (one has a higher minor, the
    /// other has bits the first lacks).
    ///
    /// # Errors
    ///
    /// `IncompatibleGeneration` when the majors differ.
    pub fn try_cmp(&self, other: &VersionTag) -> VersionResult<Option<Ordering>> {
        self.ensure_same_generation(other)?;

        if self == other {
            return Ok(Some(Ordering::Equal));
        }
        if self.satisfies(other) {
            return Ok(Some(Ordering::Greater));
        }
        if other.satisfies(self) {
            return Ok(Some(Ordering::Less));
        }
        Ok(None)
    }

    /// Smallest tag that is at least as large as both inputs
    ///
    /// # Errors
    ///
    /// `IncompatibleGeneration` when the majors differ.
    pub fn join(&self, other: &VersionTag) -> VersionResult<VersionTag> {
        self.ensure_same_generation(other)?;
        Ok(VersionTag {
            major: self.major,
            minor: self.minor.max(other.minor),
            features: self.features.union(other.features),
        })
    }

    /// True iff moving from `self` to `next` lowers neither axis
    ///
    /// # Errors
    ///
    /// `IncompatibleGeneration` when the majors differ.
    pub fn is_monotone_step(&self, next: &VersionTag) -> VersionResult<bool> {
        Ok(matches!(
            self.try_cmp(next)?,
            Some(Ordering::Less) | Some(Ordering::Equal)
        ))
    }

    fn ensure_same_generation(&self, other: &VersionTag) -> VersionResult<()> {
        if self.major != other.major {
            return Err(VersionError::IncompatibleGeneration {
                current: self.major,
                required: other.major,
            });
        }
        Ok(())
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}+{}", self.major, self.minor, self.features)
    }
}
