//! # Peer Types
//!
//! Peer-announcement wire shape, the persisted known-peers record and the
//! key under which a live connection is tracked.
//!
//! ## Wire Format
//!
//! ```text
//! message EventPeer {
//!   required string id = 1;
//!   repeated Address addresses = 2;
//! }
//!
//! message Address {
//!   required string ip = 1;
//!   required uint32 port = 2;
//! }
//! ```

use crate::errors::WireError;
use prost::Message;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A reachable endpoint of a node.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct Address {
    #[prost(string, required, tag = "1")]
    pub ip: String,
    #[prost(uint32, required, tag = "2")]
    pub port: u32,
}

impl Address {
    /// Create a new address.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port: u32::from(port),
        }
    }
}

/// Gossip announcement of a node's own endpoints.
///
/// Persisted as JSON under `!!MYEVENTPEER!!` and compared structurally before
/// being re-announced.
#[derive(Clone, PartialEq, Eq, Message, Serialize, Deserialize)]
pub struct EventPeer {
    #[prost(string, required, tag = "1")]
    pub id: String,
    #[prost(message, repeated, tag = "2")]
    pub addresses: Vec<Address>,
}

impl EventPeer {
    /// Create a new announcement.
    pub fn new(id: impl Into<String>, addresses: Vec<Address>) -> Self {
        Self {
            id: id.into(),
            addresses,
        }
    }

    /// Decode from protocol-buffer bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Self::decode(bytes).map_err(|e| WireError::Malformed {
            message: "EventPeer",
            reason: e.to_string(),
        })
    }

    /// The address other nodes dial, if any was advertised.
    #[must_use]
    pub fn primary_address(&self) -> Option<&Address> {
        self.addresses.first()
    }
}

/// One entry of the persisted known-peers list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownPeer {
    pub address: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
}

// Older stores persisted the port as a string.
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

impl KnownPeer {
    /// Parse the persisted `!!PEERS!!` record.
    pub fn parse_list(bytes: &[u8]) -> Result<Vec<Self>, WireError> {
        serde_json::from_slice(bytes).map_err(|e| WireError::InvalidRecord {
            key: "!!PEERS!!".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Key of a live connection.
///
/// Outbound connections are keyed by the dialed `host:port`; inbound
/// connections by a locally assigned sequential id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeerKey {
    /// A connection this node dialed.
    Outbound { host: String, port: u16 },
    /// A connection accepted by one of this node's listeners.
    Inbound(u64),
}

impl PeerKey {
    /// Key for an outbound target.
    pub fn outbound(host: impl Into<String>, port: u16) -> Self {
        Self::Outbound {
            host: host.into(),
            port,
        }
    }

    /// The known-peers entry for an outbound key.
    #[must_use]
    pub fn as_known_peer(&self) -> Option<KnownPeer> {
        match self {
            Self::Outbound { host, port } => Some(KnownPeer {
                address: host.clone(),
                port: *port,
            }),
            Self::Inbound(_) => None,
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound { host, port } => write!(f, "{}:{}", host, port),
            Self::Inbound(id) => write!(f, "inbound#{}", id),
        }
    }
}
