//! Document deltas
//!
//! A delta is one mutation applied on top of the prior resolved state of a
//! document. State is `Option<JsonValue>`: `None` means the document does
//! not exist (never written, or deleted).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Mutation applied on top of prior document state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Delta {
    /// Replace the document with a literal value
    Literal {
        /// New document content
        value: JsonValue,
    },
    /// Delete the document
    Delete,
    /// Shallow-merge keys into an object document
    ///
    /// A `null` entry removes that key. Applied to a missing or non-object
    /// document, the update starts from an empty object.
    MapUpdate {
        /// Keys to set or remove
        entries: Map<String, JsonValue>,
    },
    /// Leave the document unchanged
    Noop,
}

impl Delta {
    /// Replace the document with `value`
    pub fn literal(value: JsonValue) -> Self {
        Delta::Literal { value }
    }

    /// Merge `entries` into the document
    pub fn map_update(entries: Map<String, JsonValue>) -> Self {
        Delta::MapUpdate { entries }
    }

    /// Fold this delta onto `state`
    pub fn apply(&self, state: Option<JsonValue>) -> Option<JsonValue> {
        match self {
            Delta::Literal { value } => Some(value.clone()),
            Delta::Delete => None,
            Delta::Noop => state,
            Delta::MapUpdate { entries } => {
                let mut object = match state {
                    Some(JsonValue::Object(map)) => map,
                    _ => Map::new(),
                };
                for (k, v) in entries {
                    if v.is_null() {
                        object.remove(k);
                    } else {
                        object.insert(k.clone(), v.clone());
                    }
                }
                Some(JsonValue::Object(object))
            }
        }
    }

    /// Delta that recreates `state` from any prior state
    pub fn from_state(state: Option<JsonValue>) -> Self {
        match state {
            Some(value) => Delta::Literal { value },
            None => Delta::Delete,
        }
    }
}
