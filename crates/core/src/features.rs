//! Feature bitmask
//!
//! Each bit marks one independently togglable on-disk feature. Bits are
//! sparse and carry no ordering relative to the minor version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Number of addressable feature bits
pub const MAX_FEATURE_BITS: u32 = u64::BITS;

/// Fixed-width set of on-disk feature flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureBits(u64);

impl FeatureBits {
    /// No features set
    pub const EMPTY: FeatureBits = FeatureBits(0);

    /// Build from a raw mask
    pub const fn from_bits(bits: u64) -> Self {
        FeatureBits(bits)
    }

    /// Single-bit mask for the feature at `position`
    ///
    /// Returns `None` when `position` is outside the mask width.
    pub const fn bit(position: u32) -> Option<Self> {
        if position < MAX_FEATURE_BITS {
            Some(FeatureBits(1u64 << position))
        } else {
            None
        }
    }

    /// Raw mask
    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// True when no bit is set
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is also set in `self`
    #[inline]
    pub const fn contains(&self, other: FeatureBits) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bits set in either mask
    #[inline]
    pub const fn union(&self, other: FeatureBits) -> Self {
        FeatureBits(self.0 | other.0)
    }

    /// Bits set in `self` but not in `other`
    #[inline]
    pub const fn difference(&self, other: FeatureBits) -> Self {
        FeatureBits(self.0 & !other.0)
    }

    /// Number of bits set
    pub const fn len(&self) -> u32 {
        self.0.count_ones()
    }

    /// Positions of the set bits, lowest first
    pub fn positions(&self) -> impl Iterator<Item = u32> {
        let bits = self.0;
        (0..MAX_FEATURE_BITS).filter(move |p| bits & (1u64 << p) != 0)
    }
}

impl BitOr for FeatureBits {
    type Output = FeatureBits;

    fn bitor(self, rhs: FeatureBits) -> FeatureBits {
        self.union(rhs)
    }
}

impl BitAnd for FeatureBits {
    type Output = FeatureBits;

    fn bitand(self, rhs: FeatureBits) -> FeatureBits {
        FeatureBits(self.0 & rhs.0)
    }
}

impl From<u64> for FeatureBits {
    fn from(bits: u64) -> Self {
        FeatureBits(bits)
    }
}

impl fmt::Display for FeatureBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}
