//! Time-ordered change identifiers
//!
//! A `ChangeId` is an RFC 4122 version-1 UUID. Its 60-bit timestamp counts
//! 100ns intervals since 1582-10-15 (the Gregorian reform); the clock
//! sequence and node bytes carry randomness so identifiers minted by
//! different processes in the same interval never collide.
//!
//! Ordering compares the embedded timestamp first and breaks ties with the
//! raw bytes, so `a < b` means "created before" whenever the timestamps
//! differ. This is NOT the byte order of the UUID: version-1 UUIDs store the
//! low timestamp bits first.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use uuid::Uuid;

use crate::error::{SorError, SorResult};
use crate::timestamp::Timestamp;

/// 100ns intervals between 1582-10-15 and 1970-01-01
const GREGORIAN_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

/// 100ns ticks per millisecond
const TICKS_PER_MILLI: u64 = 10_000;

/// Largest timestamp a version-1 UUID can hold
const MAX_TICKS: u64 = (1 << 60) - 1;

/// Last ticks value handed out by `ChangeId::now()`
static LAST_TICKS: AtomicU64 = AtomicU64::new(0);

/// Unique, time-ordered identifier of one timeline entry
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Mint an identifier for the current instant
    ///
    /// Identifiers minted by one process are strictly increasing even when
    /// the wall clock stalls or steps backwards.
    pub fn now() -> Self {
        let wall = millis_to_ticks(Timestamp::now().as_millis());
        let mut prev = LAST_TICKS.load(AtomicOrdering::Relaxed);
        let ticks = loop {
            let next = wall.max(prev.saturating_add(1)).min(MAX_TICKS);
            match LAST_TICKS.compare_exchange_weak(
                prev,
                next,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(actual) => prev = actual,
            }
        };
        let mut rng = rand::thread_rng();
        Self::from_parts(ticks, rng.gen(), rng.gen())
    }

    /// Identifier whose embedded timestamp is exactly `millis`
    ///
    /// Clock sequence and node are random.
    pub fn from_millis(millis: u64) -> Self {
        let mut rng = rand::thread_rng();
        Self::from_parts(millis_to_ticks(millis), rng.gen(), rng.gen())
    }

    /// Smallest identifier with the given millisecond timestamp
    pub fn min_at_millis(millis: u64) -> Self {
        Self::from_parts(millis_to_ticks(millis), 0, [0u8; 6])
    }

    /// Largest identifier with the given millisecond timestamp
    pub fn max_at_millis(millis: u64) -> Self {
        let ticks = millis_to_ticks(millis)
            .saturating_add(TICKS_PER_MILLI - 1)
            .min(MAX_TICKS);
        Self::from_parts(ticks, u16::MAX, [0xFF; 6])
    }

    /// Wrap an existing UUID
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` unless `uuid` is a version-1 (time-based) UUID.
    pub fn from_uuid(uuid: Uuid) -> SorResult<Self> {
        if uuid.get_version_num() != 1 {
            return Err(SorError::invalid_input(format!(
                "change id {} is not a time-based UUID",
                uuid
            )));
        }
        Ok(ChangeId(uuid))
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Embedded 60-bit timestamp in 100ns ticks since 1582-10-15
    pub fn ticks(&self) -> u64 {
        self.0.get_timestamp().map_or(0, |ts| ts.to_gregorian().0)
    }

    /// Wall-clock milliseconds since Unix epoch at which this id was minted
    ///
    /// Ids minted before 1970 clamp to 0.
    pub fn timestamp_millis(&self) -> u64 {
        self.ticks().saturating_sub(GREGORIAN_OFFSET) / TICKS_PER_MILLI
    }

    /// Creation time as a `Timestamp`
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_millis(self.timestamp_millis())
    }

    fn from_parts(ticks: u64, clock_seq: u16, node: [u8; 6]) -> Self {
        let ts = uuid::Timestamp::from_gregorian(ticks.min(MAX_TICKS), clock_seq);
        ChangeId(Uuid::new_v1(ts, &node))
    }
}

fn millis_to_ticks(millis: u64) -> u64 {
    millis
        .saturating_mul(TICKS_PER_MILLI)
        .saturating_add(GREGORIAN_OFFSET)
        .min(MAX_TICKS)
}

impl Ord for ChangeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks()
            .cmp(&other.ticks())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for ChangeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.0)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChangeId {
    type Err = SorError;

    fn from_str(s: &str) -> SorResult<Self> {
        let uuid = Uuid::parse_str(s)
            .map_err(|e| SorError::invalid_input(format!("invalid change id '{}': {}", s, e)))?;
        ChangeId::from_uuid(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_now_is_version_one() {
        let id = ChangeId::now();
        assert_eq!(id.as_uuid().get_version_num(), 1);
    }

    #[test]
    fn test_now_is_strictly_increasing() {
        let ids: Vec<ChangeId> = (0..1000).map(|_| ChangeId::now()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        let id = ChangeId::from_millis(1_700_000_000_123);
        assert_eq!(id.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(id.timestamp(), Timestamp::from_millis(1_700_000_000_123));
    }

    #[test]
    fn test_min_max_bracket_same_millisecond() {
        let ms = 1_600_000_000_000;
        let min = ChangeId::min_at_millis(ms);
        let max = ChangeId::max_at_millis(ms);
        let id = ChangeId::from_millis(ms);
        assert!(min <= id);
        assert!(id <= max);
        assert!(max < ChangeId::min_at_millis(ms + 1));
        assert_eq!(max.timestamp_millis(), ms);
    }

    #[test]
    fn test_orders_by_time_not_bytes() {
        // 2^32 ticks apart: the earlier id has a larger time_low field.
        let early = ChangeId::from_parts(GREGORIAN_OFFSET + 0xFFFF_FFFF, 0, [0; 6]);
        let late = ChangeId::from_parts(GREGORIAN_OFFSET + 0x1_0000_0000, 0, [0; 6]);
        assert!(early.as_uuid().as_bytes() > late.as_uuid().as_bytes());
        assert!(early < late);
    }

    #[test]
    fn test_layout_is_rfc4122_time_based() {
        let ticks = GREGORIAN_OFFSET + 0x0ABC_DEF0_1234_5678;
        let id = ChangeId::from_parts(ticks, 0x2A5A, [1, 2, 3, 4, 5, 6]);
        assert_eq!(id.as_uuid().get_version_num(), 1);
        assert_eq!(id.as_uuid().get_variant(), uuid::Variant::RFC4122);
        assert_eq!(id.as_uuid().get_node_id(), Some([1, 2, 3, 4, 5, 6]));
        assert_eq!(id.ticks(), ticks & MAX_TICKS);
    }

    #[test]
    fn test_parse_round_trip() {
        let id = ChangeId::now();
        let parsed: ChangeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_random_uuid() {
        let err = Uuid::new_v4().to_string().parse::<ChangeId>().unwrap_err();
        assert!(err.is_validation());
    }

    proptest! {
        #[test]
        fn prop_ticks_round_trip(
            ticks in GREGORIAN_OFFSET..=MAX_TICKS,
            seq in 0u16..0x4000,
            node in any::<[u8; 6]>(),
        ) {
            prop_assert_eq!(ChangeId::from_parts(ticks, seq, node).ticks(), ticks);
        }

        #[test]
        fn prop_ordering_follows_millis(a in 0u64..4_000_000_000_000, b in 0u64..4_000_000_000_000) {
            let ia = ChangeId::from_millis(a);
            let ib = ChangeId::from_millis(b);
            if a < b {
                prop_assert!(ia < ib);
            } else if a > b {
                prop_assert!(ia > ib);
            }
        }
    }
}
