//! Domain layer: the codec contract, the live registry and the system table.

pub mod codec;
pub mod errors;
pub mod registry;
pub mod system;
