//! # Shared Types Crate
//!
//! Types that every Hyperbus crate agrees on.
//!
//! ## Design Principles
//!
//! - **Wire compatibility**: `Envelope` and `EventPeer` are protocol-buffer
//!   messages and encode bit-for-bit like any other implementation sharing a
//!   store or a network with this one.
//! - **Decoded vs raw**: a payload is decoded only when a codec is registered
//!   for its name; otherwise it travels as opaque bytes (`Payload::Raw`).
//! - **Persisted metadata**: the well-known keys under which node metadata is
//!   stored next to the log live in [`keys`].

pub mod envelope;
pub mod errors;
pub mod event;
pub mod keys;
pub mod peer;

pub use envelope::Envelope;
pub use errors::*;
pub use event::{Cursor, DecodedEvent, Payload};
pub use peer::{Address, EventPeer, KnownPeer, PeerKey};

/// Name of the system envelope message.
pub const EVENT_MESSAGE: &str = "Event";

/// Name of the system peer-announcement message.
pub const EVENT_PEER_MESSAGE: &str = "EventPeer";
