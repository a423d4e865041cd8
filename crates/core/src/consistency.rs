//! Read and write consistency levels
//!
//! The levels are forwarded to the backend untouched. The in-memory backend
//! is always strongly consistent and ignores them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica agreement required for a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadConsistency {
    /// Read from a quorum of replicas
    #[default]
    Strong,
    /// Read from any single replica
    Weak,
}

/// Replica acknowledgement required for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteConsistency {
    /// Acknowledged by a quorum in the local data center
    #[default]
    Strong,
    /// Acknowledged by any single replica
    Weak,
    /// Acknowledged by a quorum in every data center
    Global,
}

impl ReadConsistency {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ReadConsistency::Strong => "strong",
            ReadConsistency::Weak => "weak",
        }
    }
}

impl WriteConsistency {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            WriteConsistency::Strong => "strong",
            WriteConsistency::Weak => "weak",
            WriteConsistency::Global => "global",
        }
    }
}

impl fmt::Display for ReadConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for WriteConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
