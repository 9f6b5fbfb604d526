//! # Log Entries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest sequence number stored per origin.
pub type Heads = HashMap<String, u64>;

/// An entry as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Local change position (1-based, assigned by this log).
    pub change: u64,
    /// Id of the log that first appended the entry.
    pub origin: String,
    /// Sequence number within `origin`.
    pub seq: u64,
    /// Entry bytes.
    pub value: Vec<u8>,
}

/// On-disk form of an entry; the change position is the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub origin: String,
    pub seq: u64,
    pub value: Vec<u8>,
}

impl StoredEntry {
    pub(crate) fn into_entry(self, change: u64) -> LogEntry {
        LogEntry {
            change,
            origin: self.origin,
            seq: self.seq,
            value: self.value,
        }
    }
}

/// Keys used by the log inside the shared store.
pub(crate) mod keys {
    pub const LOG_ID: &[u8] = b"!log!id";
    pub const CHANGES: &[u8] = b"!log!changes";
    pub const HEADS: &[u8] = b"!log!heads";

    pub fn entry(change: u64) -> Vec<u8> {
        format!("!log!entry!{:020}", change).into_bytes()
    }
}
