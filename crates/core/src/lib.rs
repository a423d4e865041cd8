//! Core types for the system-of-record store
//!
//! This crate defines the foundational types used throughout the system:
//! - Key: (table, row key) pair addressing one document
//! - ChangeId: time-ordered UUID identifying one timeline entry
//! - Change: closed variant over Delta and Compaction entries
//! - Delta: mutation folded onto prior document state
//! - Timestamp / Clock: millisecond time and an injectable clock
//! - ReadConsistency / WriteConsistency: replica agreement levels
//! - SorError: error type shared by every crate

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod change_id;
pub mod clock;
pub mod consistency;
pub mod delta;
pub mod error;
pub mod key;
pub mod timestamp;

pub use change::{Change, ChangeBody, Compaction, DeltaClusteringKey, History};
pub use change_id::ChangeId;
pub use clock::{Clock, ManualClock, SystemClock};
pub use consistency::{ReadConsistency, WriteConsistency};
pub use delta::Delta;
pub use error::{SorError, SorResult};
pub use key::{validate_row_key, validate_table_name, Key, KeyError};
pub use timestamp::Timestamp;
