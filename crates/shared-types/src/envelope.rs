//! # Event Envelope
//!
//! Every entry appended to the log is an `Envelope`: the event name plus the
//! payload bytes produced by that name's codec (or the raw bytes when no codec
//! is registered).
//!
//! ## Wire Format
//!
//! ```text
//! message Event {
//!   required string name = 1;
//!   required bytes payload = 2;
//! }
//! ```

use crate::errors::WireError;
use prost::Message;

/// The wire wrapper around every event.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Envelope {
    /// Event name, used to select the payload codec.
    #[prost(string, required, tag = "1")]
    pub name: String,
    /// Codec-encoded (or raw) payload.
    #[prost(bytes = "vec", required, tag = "2")]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Encode to protocol-buffer bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decode from protocol-buffer bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Self::decode(bytes).map_err(|e| WireError::Malformed {
            message: "Event",
            reason: e.to_string(),
        })
    }
}
