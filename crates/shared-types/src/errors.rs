//! # Error Types
//!
//! Errors shared by the wire-level types.

use thiserror::Error;

/// Errors decoding a system wire message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    /// The bytes are not a valid encoding of the named message.
    #[error("Malformed {message}: {reason}")]
    Malformed {
        message: &'static str,
        reason: String,
    },

    /// A persisted JSON record could not be parsed.
    #[error("Invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },
}
