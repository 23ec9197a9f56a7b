//! VERSION record format
//!
//! Each database keeps its format version in a small fixed-size record in its
//! metadata directory. The record layout is itself versioned by `major`:
//! readers check the magic and the major before interpreting anything else.
//! The CRC32 trailer is common to every layout.
//!
//! # Format (major 1)
//!
//! ```text
//! +------------------+
//! | Magic: "STRV"    | 4 bytes
//! | Major            | 4 bytes (u32 LE)
//! | Minor            | 4 bytes (u32 LE)
//! | Feature bits     | 8 bytes (u64 LE)
//! | Generation       | 8 bytes (u64 LE, committed write counter)
//! | Reserved         | 4 bytes (zero)
//! | CRC32            | 4 bytes
//! +------------------+
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use strata_core::{FeatureBits, VersionError, VersionTag};

/// VERSION magic bytes: "STRV" (0x53545256)
pub const VERSION_RECORD_MAGIC: [u8; 4] = *b"STRV";

/// Majors whose record layout this build can decode
pub const SUPPORTED_RECORD_MAJOR: u32 = 1;

/// Size of a major-1 record
pub const VERSION_RECORD_SIZE: usize = 36;

/// Bytes needed to reach the major field
const PREFIX_SIZE: usize = 8;

/// Persisted version entry of one database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    /// Committed tag
    pub tag: VersionTag,
    /// Number of committed upgrades since creation
    pub generation: u64,
}

impl VersionRecord {
    /// Record for a freshly created database
    pub fn initial(tag: VersionTag) -> Self {
        VersionRecord { tag, generation: 0 }
    }

    /// Record that replaces `self` with `target`
    pub fn successor(&self, target: VersionTag) -> Self {
        VersionRecord {
            tag: target,
            generation: self.generation + 1,
        }
    }

    /// Serialize to bytes
    ///
    /// # Errors
    ///
    /// `UnknownLayout` when the tag's major has no layout in this build.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        if self.tag.major != SUPPORTED_RECORD_MAJOR {
            return Err(RecordError::UnknownLayout {
                major: self.tag.major,
            });
        }

        let mut bytes = Vec::with_capacity(VERSION_RECORD_SIZE);
        bytes.extend_from_slice(&VERSION_RECORD_MAGIC);
        bytes.write_u32::<LittleEndian>(self.tag.major)?;
        bytes.write_u32::<LittleEndian>(self.tag.minor)?;
        bytes.write_u64::<LittleEndian>(self.tag.features.bits())?;
        bytes.write_u64::<LittleEndian>(self.generation)?;
        bytes.write_u32::<LittleEndian>(0)?;

        let crc = crc32fast::hash(&bytes);
        bytes.write_u32::<LittleEndian>(crc)?;

        debug_assert_eq!(bytes.len(), VERSION_RECORD_SIZE);
        Ok(bytes)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < PREFIX_SIZE + 4 {
            return Err(RecordError::TooShort { len: bytes.len() });
        }

        let (data, trailer) = bytes.split_at(bytes.len() - 4);
        let stored_crc = Cursor::new(trailer).read_u32::<LittleEndian>()?;
        let computed_crc = crc32fast::hash(data);
        if stored_crc != computed_crc {
            return Err(RecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        if data[0..4] != VERSION_RECORD_MAGIC {
            return Err(RecordError::InvalidMagic);
        }

        let mut cursor = Cursor::new(&data[4..]);
        let major = cursor.read_u32::<LittleEndian>()?;
        if major != SUPPORTED_RECORD_MAJOR {
            return Err(RecordError::UnknownLayout { major });
        }

        if bytes.len() != VERSION_RECORD_SIZE {
            return Err(RecordError::BadLength {
                major,
                len: bytes.len(),
            });
        }

        let minor = cursor.read_u32::<LittleEndian>()?;
        let features = FeatureBits::from_bits(cursor.read_u64::<LittleEndian>()?);
        let generation = cursor.read_u64::<LittleEndian>()?;
        // Reserved word is ignored on read

        Ok(VersionRecord {
            tag: VersionTag::new(major, minor).with_features(features),
            generation,
        })
    }
}

/// Errors decoding a VERSION record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Record shorter than the common prefix plus trailer
    #[error("VERSION record too short ({len} bytes)")]
    TooShort {
        /// Bytes present
        len: usize,
    },

    /// Invalid magic bytes
    #[error("Invalid magic bytes")]
    InvalidMagic,

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected CRC32 value (from file)
        expected: u32,
        /// Computed CRC32 value
        computed: u32,
    },

    /// Record was written by a format generation this build cannot decode
    #[error("no record layout for major {major}")]
    UnknownLayout {
        /// Major found in the record
        major: u32,
    },

    /// Length does not match the layout for the record's major
    #[error("VERSION record for major {major} has wrong length {len}")]
    BadLength {
        /// Major found in the record
        major: u32,
        /// Bytes present
        len: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RecordError> for VersionError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::UnknownLayout { major } => VersionError::IncompatibleGeneration {
                current: major,
                required: SUPPORTED_RECORD_MAJOR,
            },
            RecordError::Io(io) => VersionError::Io(io),
            other => VersionError::Corruption(other.to_string()),
        }
    }
}
