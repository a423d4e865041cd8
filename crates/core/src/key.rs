//! Document keys and identifier validation
//!
//! A document is addressed by a `(table, row key)` pair. Tables are
//! independent namespaces; row keys order lexicographically within a table.
//!
//! ## Rules
//!
//! - Table names and row keys must not be empty
//! - Neither may contain NUL bytes (\0)
//! - Table names are at most `MAX_TABLE_NAME_BYTES` bytes
//! - Row keys are at most `MAX_ROW_KEY_BYTES` bytes
//!
//! The empty string is reserved: split tokens and scans use it to mean
//! "unbounded", so it can never name a real row.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a table name in bytes
pub const MAX_TABLE_NAME_BYTES: usize = 255;

/// Maximum length of a row key in bytes
pub const MAX_ROW_KEY_BYTES: usize = 1024;

/// Identifies one logical document: a row within a table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawKey")]
pub struct Key {
    table: String,
    key: String,
}

/// Unvalidated wire form of `Key`
#[derive(Deserialize)]
struct RawKey {
    table: String,
    key: String,
}

impl TryFrom<RawKey> for Key {
    type Error = KeyError;

    fn try_from(raw: RawKey) -> Result<Self, KeyError> {
        Key::new(raw.table, raw.key)
    }
}

impl Key {
    /// Create a validated key
    ///
    /// # Errors
    ///
    /// Returns `KeyError` if either identifier breaks the rules above.
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Result<Self, KeyError> {
        let table = table.into();
        let key = key.into();
        validate_table_name(&table)?;
        validate_row_key(&key)?;
        Ok(Key { table, key })
    }

    /// Table this document belongs to
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row key within the table
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.key)
    }
}

/// Validate a table name
pub fn validate_table_name(table: &str) -> Result<(), KeyError> {
    validate_identifier(table, "table", MAX_TABLE_NAME_BYTES)
}

/// Validate a row key
pub fn validate_row_key(key: &str) -> Result<(), KeyError> {
    validate_identifier(key, "key", MAX_ROW_KEY_BYTES)
}

fn validate_identifier(value: &str, what: &'static str, max: usize) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { what });
    }
    if value.contains('\x00') {
        return Err(KeyError::ContainsNul { what });
    }
    let len = value.len();
    if len > max {
        return Err(KeyError::TooLong {
            what,
            actual: len,
            max,
        });
    }
    Ok(())
}

/// Identifier validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Identifier is empty (length 0)
    #[error("{what} cannot be empty")]
    Empty {
        /// Which identifier
        what: &'static str,
    },

    /// Identifier contains NUL byte (\0)
    #[error("{what} cannot contain NUL bytes")]
    ContainsNul {
        /// Which identifier
        what: &'static str,
    },

    /// Identifier exceeds maximum length
    #[error("{what} too long: {actual} bytes exceeds maximum {max}")]
    TooLong {
        /// Which identifier
        what: &'static str,
        /// Actual length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },
}
