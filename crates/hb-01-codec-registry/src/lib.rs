//! # Codec Registry (hb-01)
//!
//! Maps event names to encode/decode pairs.
//!
//! ## Resolution Rules
//!
//! | Case | Behaviour |
//! |------|-----------|
//! | Codec registered for name | payload encoded/decoded through it |
//! | No codec for name | payload passes through as raw bytes |
//! | Same name registered twice | last registration wins |
//! | System names (`Event`, `EventPeer`) | merged last at initialization |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - The `Codec` contract, the registry and the system codec table
//! - `ports/` - `SchemaCompiler` (schema text to codecs)
//! - `adapters/` - JSON codec and the protocol-buffer schema compiler
//!
//! ## Usage
//!
//! ```ignore
//! use hb_01_codec_registry::{CodecRegistry, CodecSource};
//!
//! let registry = CodecRegistry::initialize(CodecSource::Schema(schema_text))?;
//! let codec = registry.lookup("Test1").expect("compiled from schema");
//! let bytes = codec.encode(&serde_json::json!({"foo": "hello", "num": 42}))?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::json::JsonCodec;
pub use adapters::proto_codec::{FieldSpec, ProtoMessageCodec, ScalarType};
pub use adapters::proto_schema::ProtoSchemaCompiler;
pub use domain::codec::{Codec, FnCodec, NamedCodec, SharedCodec};
pub use domain::errors::CodecError;
pub use domain::registry::{CodecBatch, CodecRegistry, CodecSource};
pub use domain::system::SystemCodecs;
pub use ports::outbound::SchemaCompiler;
