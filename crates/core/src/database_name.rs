//! Database name type
//!
//! Every database owns exactly one version entry, keyed by its name. Names
//! map directly onto a directory under the store root, so they are validated
//! to be safe path components.
//!
//! ## Validation
//!
//! Database names must:
//! - Be 1-128 characters
//! - Contain only alphanumeric, dash, underscore, dot
//! - Not start with a dash or dot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a database name
pub const MAX_DATABASE_NAME_LENGTH: usize = 128;

/// Identifier of a database whose on-disk version is tracked
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName(String);

/// Error when validating a database name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseNameError {
    /// Name is empty
    #[error("database name cannot be empty")]
    Empty,

    /// Name exceeds maximum length
    #[error("database name too long: {length} chars (max {max})")]
    TooLong {
        /// Actual length of the name
        length: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Name contains invalid character
    #[error("invalid character '{char}' at position {position} (only alphanumeric, dash, underscore, dot allowed)")]
    InvalidChar {
        /// The invalid character
        char: char,
        /// Position of the invalid character
        position: usize,
    },

    /// Name starts with invalid character
    #[error("database name cannot start with '{char}'")]
    InvalidStart {
        /// The invalid starting character
        char: char,
    },
}

impl DatabaseName {
    /// Create a new DatabaseName, validating the input
    ///
    /// # Errors
    ///
    /// Returns `DatabaseNameError` if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self, DatabaseNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(DatabaseName(name))
    }

    /// Validate a database name
    pub fn validate(name: &str) -> Result<(), DatabaseNameError> {
        if name.is_empty() {
            return Err(DatabaseNameError::Empty);
        }

        if name.len() > MAX_DATABASE_NAME_LENGTH {
            return Err(DatabaseNameError::TooLong {
                length: name.len(),
                max: MAX_DATABASE_NAME_LENGTH,
            });
        }

        // Length checked above, so there is a first char
        if let Some(first) = name.chars().next() {
            if first == '-' || first == '.' {
                return Err(DatabaseNameError::InvalidStart { char: first });
            }
        }

        for (position, c) in name.chars().enumerate() {
            if !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.') {
                return Err(DatabaseNameError::InvalidChar { char: c, position });
            }
        }

        Ok(())
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatabaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DatabaseName {
    type Error = DatabaseNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DatabaseName::new(value)
    }
}

impl TryFrom<&str> for DatabaseName {
    type Error = DatabaseNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        DatabaseName::new(value)
    }
}

impl From<DatabaseName> for String {
    fn from(name: DatabaseName) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(DatabaseName::new("orders").is_ok());
        assert!(DatabaseName::new("orders_2024.v2").is_ok());
        assert!(DatabaseName::new("_internal").is_ok());
        assert!(DatabaseName::new("a".repeat(MAX_DATABASE_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(DatabaseName::new(""), Err(DatabaseNameError::Empty));
        assert_eq!(
            DatabaseName::new(".."),
            Err(DatabaseNameError::InvalidStart { char: '.' })
        );
        assert_eq!(
            DatabaseName::new("-db"),
            Err(DatabaseNameError::InvalidStart { char: '-' })
        );
        assert_eq!(
            DatabaseName::new("a/b"),
            Err(DatabaseNameError::InvalidChar {
                char: '/',
                position: 1
            })
        );
        assert!(matches!(
            DatabaseName::new("x".repeat(MAX_DATABASE_NAME_LENGTH + 1)),
            Err(DatabaseNameError::TooLong { .. })
        ));
    }

    #[test]
    fn test_serde_validates() {
        let ok: DatabaseName = serde_json::from_str("\"orders\"").unwrap();
        assert_eq!(ok.as_str(), "orders");
        let bad: Result<DatabaseName, _> = serde_json::from_str("\"../etc\"");
        assert!(bad.is_err());
    }
}
