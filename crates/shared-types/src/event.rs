//! # Decoded Events
//!
//! The application-facing view of a log entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a change feed or stream starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cursor {
    /// Only entries appended after subscription.
    #[default]
    Now,
    /// The whole history in append order, then live entries.
    Beginning,
}

/// An event payload.
///
/// `Decoded` holds the value produced by the event's codec; `Raw` holds the
/// undecoded payload bytes of an event whose name has no codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A value produced by (or destined for) a codec.
    Decoded(Value),
    /// Opaque bytes, passed through untouched.
    Raw(Vec<u8>),
}

impl Payload {
    /// The decoded value, if this payload went through a codec.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// The raw bytes, if no codec was applied.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Decoded(_) => None,
            Self::Raw(bytes) => Some(bytes),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Decoded(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(bytes)
    }
}

/// A `{name, payload}` record as seen by listeners and streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Event name.
    pub name: String,
    /// Decoded or raw payload.
    pub payload: Payload,
}

impl DecodedEvent {
    /// Create a new decoded event.
    pub fn new(name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Shorthand for `self.payload.as_value()`.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.payload.as_value()
    }
}
