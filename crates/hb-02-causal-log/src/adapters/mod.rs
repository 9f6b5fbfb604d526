//! Storage backends and the replication wire framing.

pub mod file;
pub mod framing;
pub mod memory;
