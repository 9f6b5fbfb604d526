//! Domain layer: log entries and errors.

pub mod entry;
pub mod errors;
