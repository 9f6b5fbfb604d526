//! # Adapters
//!
//! - `event_log` - Envelope encoding and decoding over the causal log
//! - `metadata` - Node identity, known peers and self-announcement records

pub mod event_log;
pub mod metadata;
