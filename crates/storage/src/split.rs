//! Split tokens
//!
//! A split is a contiguous, half-open range of row keys
//! `(start_exclusive, end_inclusive]` within one table. Tokens are the one
//! bit-exact external artifact of the scan machinery:
//!
//! ```text
//! token := "S" hex(start) "E" hex(end)
//! hex   := lowercase hex digits of the UTF-8 bytes, possibly empty
//! ```
//!
//! An empty `start` means "from the first key"; an empty `end` means
//! unbounded. Uppercase `E` can never appear in lowercase hex, so the
//! separator is unambiguous. Anything else is rejected outright, never
//! parsed partially.

use std::fmt;

use sor_core::{SorError, SorResult};

const START_MARKER: char = 'S';
const END_MARKER: char = 'E';

/// Decoded key range of one split
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SplitRange {
    start_exclusive: String,
    end_inclusive: Option<String>,
}

impl SplitRange {
    /// Range `(start_exclusive, end_inclusive]`; `None` end is unbounded
    ///
    /// An empty `start_exclusive` starts at the first key. An empty
    /// `end_inclusive` is treated as unbounded, matching the token grammar.
    pub fn new(start_exclusive: impl Into<String>, end_inclusive: Option<String>) -> Self {
        SplitRange {
            start_exclusive: start_exclusive.into(),
            end_inclusive: end_inclusive.filter(|end| !end.is_empty()),
        }
    }

    /// Lower bound, exclusive; empty means the first key
    pub fn start_exclusive(&self) -> &str {
        &self.start_exclusive
    }

    /// Upper bound, inclusive; `None` means unbounded
    pub fn end_inclusive(&self) -> Option<&str> {
        self.end_inclusive.as_deref()
    }

    /// True if `key` falls inside this range
    pub fn contains(&self, key: &str) -> bool {
        key > self.start_exclusive.as_str() && self.end_inclusive().map_or(true, |end| key <= end)
    }

    /// Encode as an opaque token
    pub fn encode(&self) -> String {
        let end = self.end_inclusive.as_deref().unwrap_or("");
        format!(
            "{}{}{}{}",
            START_MARKER,
            hex::encode(self.start_exclusive.as_bytes()),
            END_MARKER,
            hex::encode(end.as_bytes())
        )
    }

    /// Decode a token produced by `encode`
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the token does not match the grammar exactly.
    pub fn decode(token: &str) -> SorResult<Self> {
        let body = token
            .strip_prefix(START_MARKER)
            .ok_or_else(|| bad_split(token, "missing start marker"))?;
        let (start_hex, end_hex) = body
            .split_once(END_MARKER)
            .ok_or_else(|| bad_split(token, "missing end marker"))?;
        let start = decode_part(token, start_hex)?;
        let end = decode_part(token, end_hex)?;
        Ok(SplitRange::new(start, Some(end)))
    }
}

impl fmt::Display for SplitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end_inclusive {
            Some(end) => write!(f, "({:?}, {:?}]", self.start_exclusive, end),
            None => write!(f, "({:?}, ∞)", self.start_exclusive),
        }
    }
}

fn decode_part(token: &str, part: &str) -> SorResult<String> {
    if !part.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(bad_split(token, "expected lowercase hex"));
    }
    let bytes = hex::decode(part).map_err(|e| bad_split(token, &e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| bad_split(token, "range bound is not UTF-8"))
}

fn bad_split(token: &str, reason: &str) -> SorError {
    SorError::invalid_input(format!("bad split '{}': {}", token, reason))
}
