//! # Codec Errors

use thiserror::Error;

/// Errors raised while compiling schemas or running codecs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The value does not fit the codec's message shape.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// The bytes are not a valid encoding of the codec's message.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// A required field is absent.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The schema text could not be compiled.
    #[error("Schema error at line {line}: {message}")]
    Schema { line: usize, message: String },
}

impl CodecError {
    pub(crate) fn schema(line: usize, message: impl Into<String>) -> Self {
        Self::Schema {
            line,
            message: message.into(),
        }
    }
}
