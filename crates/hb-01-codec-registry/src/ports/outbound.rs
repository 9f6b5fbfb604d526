//! # Outbound Ports
//!
//! Dependencies the registry needs from the outside world.

use crate::domain::codec::NamedCodec;
use crate::domain::errors::CodecError;

/// Compiles message schema text into per-type codecs.
///
/// # Example
///
/// ```ignore
/// let codecs = compiler.compile("message Ping { required uint64 at = 1; }")?;
/// assert_eq!(codecs[0].name, "Ping");
/// ```
pub trait SchemaCompiler: Send + Sync {
    /// Compile every message type defined in `schema`, in definition order.
    fn compile(&self, schema: &str) -> Result<Vec<NamedCodec>, CodecError>;
}
