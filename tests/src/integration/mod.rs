//! Cross-crate integration scenarios.

#[cfg(test)]
mod support;

pub mod discovery;
pub mod local_bus;
pub mod replication;
