//! # Codec Contract
//!
//! A codec converts between the dynamic decoded form of a payload
//! (`serde_json::Value`) and its wire bytes.

use crate::domain::errors::CodecError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Encode/decode pair for one named message type.
///
/// Codecs are not validated when registered; a codec that cannot handle a
/// value reports it from `encode`/`decode`.
pub trait Codec: Send + Sync {
    /// Encode a decoded value into payload bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decode payload bytes into a value.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// A codec shared between the registry and its users.
pub type SharedCodec = Arc<dyn Codec>;

/// A codec together with the name it is registered under.
#[derive(Clone)]
pub struct NamedCodec {
    pub name: String,
    pub codec: SharedCodec,
}

impl NamedCodec {
    /// Create a new named codec.
    pub fn new(name: impl Into<String>, codec: SharedCodec) -> Self {
        Self {
            name: name.into(),
            codec,
        }
    }
}

impl fmt::Debug for NamedCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCodec").field("name", &self.name).finish()
    }
}

type EncodeFn = dyn Fn(&Value) -> Result<Vec<u8>, CodecError> + Send + Sync;
type DecodeFn = dyn Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync;

/// A codec built from two closures.
pub struct FnCodec {
    encode: Box<EncodeFn>,
    decode: Box<DecodeFn>,
}

impl FnCodec {
    /// Create a codec from an encode and a decode function.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&Value) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }

    /// Wrap into a `SharedCodec`.
    #[must_use]
    pub fn shared(self) -> SharedCodec {
        Arc::new(self)
    }
}

impl Codec for FnCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        (self.decode)(bytes)
    }
}
