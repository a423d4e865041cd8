//! Error types for the system-of-record core
//!
//! This module defines the error type shared by every crate in the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! - **Validation** (`InvalidInput`): missing identifiers, malformed split
//!   tokens, non-positive sizes. Fail fast, never retried.
//! - **Transient** (`ConcurrentModification`): a backend saw a concurrent
//!   writer while copying a timeline. Read paths retry these internally.
//! - **Best-effort maintenance** (`HistoryArchive`): logged and reported,
//!   never blocks the primary write.
//! - **Backend** (`Storage`, `Coordination`): propagated unchanged.
//!
//! "Does not exist" is modeled as `Option::None`, never as an error.

use crate::key::KeyError;
use thiserror::Error;

/// Result type alias for system-of-record operations
pub type SorResult<T> = std::result::Result<T, SorError>;

/// Error types for the system-of-record core
#[derive(Debug, Error)]
pub enum SorError {
    /// Caller supplied an invalid argument
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// The timeline was mutated while a reader was copying it
    #[error("Concurrent modification of {table}/{key}")]
    ConcurrentModification {
        /// Table being read
        table: String,
        /// Row key being read
        key: String,
    },

    /// Archiving delta history failed
    #[error("History archive error: {message}")]
    HistoryArchive {
        /// Failure detail
        message: String,
    },

    /// Timeline store failure
    #[error("Storage error: {message}")]
    Storage {
        /// Failure detail
        message: String,
    },

    /// Coordination store or leader election failure
    #[error("Coordination error: {message}")]
    Coordination {
        /// Failure detail
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal {
        /// Failure detail
        message: String,
    },
}

impl SorError {
    /// Create a new validation error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        SorError::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a new concurrent modification error
    pub fn concurrent_modification(table: impl Into<String>, key: impl Into<String>) -> Self {
        SorError::ConcurrentModification {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Create a new history archive error
    pub fn history_archive(msg: impl Into<String>) -> Self {
        SorError::HistoryArchive {
            message: msg.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        SorError::Storage {
            message: msg.into(),
        }
    }

    /// Create a new coordination error
    pub fn coordination(msg: impl Into<String>) -> Self {
        SorError::Coordination {
            message: msg.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        SorError::Internal {
            message: msg.into(),
        }
    }

    /// True for caller errors that must never be retried
    pub fn is_validation(&self) -> bool {
        matches!(self, SorError::InvalidInput { .. })
    }

    /// True for errors that read paths retry internally
    pub fn is_transient(&self) -> bool {
        matches!(self, SorError::ConcurrentModification { .. })
    }
}

impl From<KeyError> for SorError {
    fn from(e: KeyError) -> Self {
        SorError::invalid_input(e.to_string())
    }
}

impl From<bincode::Error> for SorError {
    fn from(e: bincode::Error) -> Self {
        SorError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SorError {
    fn from(e: serde_json::Error) -> Self {
        SorError::Serialization(e.to_string())
    }
}
