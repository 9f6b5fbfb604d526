//! # System Codecs
//!
//! The built-in wire shapes every node understands. The table is versioned
//! and immutable: it is built once and merged into each registry at
//! initialization.
//!
//! | Version | Names |
//! |---------|-------|
//! | V1 | `Event`, `EventPeer` |

use crate::domain::codec::{Codec, NamedCodec};
use crate::domain::errors::CodecError;
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Envelope, EventPeer, EVENT_MESSAGE, EVENT_PEER_MESSAGE};
use std::sync::{Arc, LazyLock};

static V1_TABLE: LazyLock<Vec<NamedCodec>> = LazyLock::new(|| {
    vec![
        NamedCodec::new(EVENT_MESSAGE, Arc::new(EventCodec)),
        NamedCodec::new(EVENT_PEER_MESSAGE, Arc::new(EventPeerCodec)),
    ]
});

/// Versions of the system codec table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCodecs {
    V1,
}

impl SystemCodecs {
    /// The table merged into new registries.
    pub const CURRENT: Self = Self::V1;

    /// The codecs of this version.
    #[must_use]
    pub fn entries(self) -> &'static [NamedCodec] {
        match self {
            Self::V1 => V1_TABLE.as_slice(),
        }
    }

    /// The names of this version's codecs.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        match self {
            Self::V1 => vec![EVENT_MESSAGE, EVENT_PEER_MESSAGE],
        }
    }
}

/// Decoded form of an `Event` envelope.
#[derive(Serialize, Deserialize)]
struct EnvelopeValue {
    name: String,
    payload: Vec<u8>,
}

/// Codec for the `Event` envelope: `{name, payload: [bytes]}`.
struct EventCodec;

impl Codec for EventCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let parsed: EnvelopeValue =
            serde_json::from_value(value.clone()).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Envelope::new(parsed.name, parsed.payload).to_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let envelope = Envelope::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        serde_json::to_value(EnvelopeValue {
            name: envelope.name,
            payload: envelope.payload,
        })
        .map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Codec for the `EventPeer` announcement: `{id, addresses: [{ip, port}]}`.
struct EventPeerCodec;

impl Codec for EventPeerCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let peer: EventPeer =
            serde_json::from_value(value.clone()).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(peer.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let peer = EventPeer::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        serde_json::to_value(peer).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
