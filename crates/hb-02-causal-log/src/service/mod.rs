//! The causal log service.

mod feed;
mod log;
mod replication;

pub use feed::ChangeFeed;
pub use log::CausalLog;
