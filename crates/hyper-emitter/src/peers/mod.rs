//! # Peers
//!
//! TCP connections to other nodes, retry policy and gossip-based discovery.

pub mod addresses;
pub mod discovery;
pub mod manager;

pub use manager::{PeerManager, PeerState};
