//! # Error Types

use hb_01_codec_registry::CodecError;
use hb_02_causal_log::{KVStoreError, LogError};
use thiserror::Error;

/// Errors returned by `HyperEmitter` operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmitterError {
    /// A storage read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A payload could not be encoded (or a schema could not be compiled).
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A decoded payload was emitted under a name without a codec.
    #[error("No codec registered for `{0}`")]
    MissingCodec(String),

    /// Binding a listening endpoint failed.
    #[error("Cannot listen on {addr}: {reason}")]
    Listen { addr: String, reason: String },

    /// An outbound connection exhausted its attempts.
    #[error("Connection to {peer} failed: {message}")]
    Connection { peer: String, message: String },

    /// `remove_listener` was given a handle that is not registered.
    #[error("No listener #{id} registered for `{name}`")]
    ListenerNotFound { name: String, id: u64 },

    /// Malformed envelope or replication traffic.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The log failed to load, so the emitter never became ready.
    #[error("Emitter failed to start: {0}")]
    NotReady(String),

    /// The emitter was closed.
    #[error("Emitter is closed")]
    Closed,

    /// The stream half was closed.
    #[error("Stream is closed")]
    StreamClosed,
}

impl From<LogError> for EmitterError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Closed | LogError::Store(KVStoreError::Closed) => EmitterError::Closed,
            LogError::Protocol(message) => EmitterError::Protocol(message),
            other => EmitterError::Storage(other.to_string()),
        }
    }
}

impl From<KVStoreError> for EmitterError {
    fn from(err: KVStoreError) -> Self {
        match err {
            KVStoreError::Closed => EmitterError::Closed,
            other => EmitterError::Storage(other.to_string()),
        }
    }
}

/// Failure reported by a listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}
