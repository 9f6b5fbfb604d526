//! # Causal Log (hb-02)
//!
//! An append-only log stored in a key-value store, with a live change feed and
//! a replicate operation that runs over any byte stream.
//!
//! ## Model
//!
//! Every entry has an **origin** (the id of the log that first appended it)
//! and a per-origin **sequence number**. Each log also numbers entries in the
//! order it stored them (its local **change** position). Replicated entries are
//! stored with a fresh local change position, so a feed reading "after change
//! N" sees entries that arrived from peers after it subscribed.
//!
//! ## Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Append-only | Entries are never rewritten or reordered |
//! | Per-origin order | A log holds an origin's entries in sequence order |
//! | No duplicates | An entry with `seq <= head(origin)` is dropped |
//! | Atomic append | Entry, heads and change counter are one batch write |
//!
//! ## Replication Protocol
//!
//! ```text
//! A                                   B
//! │── Handshake { log_id, heads } ──→ │
//! │ ←── Handshake { log_id, heads } ──│
//! │── Entry { origin, seq, value } ─→ │   everything B's heads lack,
//! │ ←─ Entry { origin, seq, value } ──│   then every new local entry
//! ```
//!
//! Frames are `[len: u32 BE][bincode body]`. Entries received from one peer
//! are forwarded to every other replication session, so chains of nodes
//! converge.
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Entries and errors
//! - `ports/` - `KeyValueStore` (the storage engine)
//! - `adapters/` - In-memory and file-backed stores, wire framing
//! - `service/` - `CausalLog` and its change feed

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::file::FileBackedKVStore;
pub use adapters::memory::InMemoryKVStore;
pub use domain::entry::{Heads, LogEntry};
pub use domain::errors::{KVStoreError, LogError};
pub use ports::outbound::{BatchOperation, KeyValueStore};
pub use service::{CausalLog, ChangeFeed};

/// Largest replication frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
