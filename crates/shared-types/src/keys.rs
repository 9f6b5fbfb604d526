//! # Persisted Metadata Keys
//!
//! Node metadata shares the key-value store with the log. These keys must stay
//! stable so that stores written by other implementations can be reopened.

/// Node identity (UTF-8 string).
pub const STORE_ID: &[u8] = b"!!STOREID!!";

/// Known peers, a JSON array of `{address, port}`.
pub const PEERS: &[u8] = b"!!PEERS!!";

/// Last self-announcement, JSON `{id, addresses: [{ip, port}]}`.
pub const MY_EVENT_PEER: &[u8] = b"!!MYEVENTPEER!!";
