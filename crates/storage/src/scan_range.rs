//! Placement-level scan ranges
//!
//! Multi-node backends partition a placement's token ring into ranges
//! grouped by replica set and host, so bulk scans can be assigned to workers
//! near the data. A single-process backend has exactly one group and host.

use serde::{Deserialize, Serialize};

/// Contiguous range of row keys, `(from_exclusive, to_inclusive]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRange {
    /// Lower bound, exclusive; `None` starts at the first key
    pub from_exclusive: Option<String>,
    /// Upper bound, inclusive; `None` is unbounded
    pub to_inclusive: Option<String>,
}

impl ScanRange {
    /// Range covering every key
    pub fn all() -> Self {
        ScanRange {
            from_exclusive: None,
            to_inclusive: None,
        }
    }

    /// Range `(from_exclusive, to_inclusive]`
    pub fn new(from_exclusive: Option<String>, to_inclusive: Option<String>) -> Self {
        ScanRange {
            from_exclusive,
            to_inclusive,
        }
    }
}

/// Ranges served by one host within one replica group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRanges {
    /// Host serving the ranges
    pub host: String,
    /// Ranges, in key order
    pub ranges: Vec<ScanRange>,
}

/// Ranges of one replica group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitGroup {
    /// Replica group name
    pub group: String,
    /// Hosts and their ranges
    pub hosts: Vec<HostRanges>,
}

/// Scan ranges of a placement, grouped by replica group and host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRangeSplits {
    /// Groups in insertion order
    pub groups: Vec<SplitGroup>,
}

impl ScanRangeSplits {
    /// Start an empty set of splits
    pub fn builder() -> ScanRangeSplitsBuilder {
        ScanRangeSplitsBuilder::default()
    }

    /// Every range across all groups and hosts
    pub fn ranges(&self) -> impl Iterator<Item = &ScanRange> {
        self.groups
            .iter()
            .flat_map(|g| g.hosts.iter())
            .flat_map(|h| h.ranges.iter())
    }
}

/// Accumulates ranges by group and host
#[derive(Debug, Default)]
pub struct ScanRangeSplitsBuilder {
    splits: ScanRangeSplits,
}

impl ScanRangeSplitsBuilder {
    /// Add `range` under `group` and `host`
    pub fn add_scan_range(mut self, group: &str, host: &str, range: ScanRange) -> Self {
        let group_idx = match self.splits.groups.iter().position(|g| g.group == group) {
            Some(idx) => idx,
            None => {
                self.splits.groups.push(SplitGroup {
                    group: group.to_string(),
                    hosts: Vec::new(),
                });
                self.splits.groups.len() - 1
            }
        };
        let hosts = &mut self.splits.groups[group_idx].hosts;
        match hosts.iter_mut().find(|h| h.host == host) {
            Some(entry) => entry.ranges.push(range),
            None => hosts.push(HostRanges {
                host: host.to_string(),
                ranges: vec![range],
            }),
        }
        self
    }

    /// Finish
    pub fn build(self) -> ScanRangeSplits {
        self.splits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_groups_by_group_and_host() {
        let a = ScanRange::new(None, Some("m".into()));
        let b = ScanRange::new(Some("m".into()), None);
        let splits = ScanRangeSplits::builder()
            .add_scan_range("g1", "h1", a.clone())
            .add_scan_range("g1", "h1", b.clone())
            .add_scan_range("g2", "h2", ScanRange::all())
            .build();
        assert_eq!(splits.groups.len(), 2);
        assert_eq!(splits.groups[0].hosts.len(), 1);
        assert_eq!(splits.groups[0].hosts[0].ranges, vec![a, b]);
        assert_eq!(splits.ranges().count(), 3);
    }
}
