//! Codec and schema-compiler implementations.

pub mod json;
pub mod proto_codec;
pub mod proto_schema;
