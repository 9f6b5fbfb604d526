//! # Error Types

use std::fmt;
use thiserror::Error;

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KVStoreError {
    /// I/O error during read/write.
    IOError { message: String },
    /// Data corruption in the store.
    CorruptionError { message: String },
    /// Another process holds the store.
    Locked { path: String },
    /// The handle was closed.
    Closed,
}

impl fmt::Display for KVStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::IOError { message } => write!(f, "KV store I/O error: {}", message),
            KVStoreError::CorruptionError { message } => {
                write!(f, "KV store corruption: {}", message)
            }
            KVStoreError::Locked { path } => write!(f, "KV store {} is locked by another process", path),
            KVStoreError::Closed => write!(f, "KV store is closed"),
        }
    }
}

impl std::error::Error for KVStoreError {}

impl From<std::io::Error> for KVStoreError {
    fn from(err: std::io::Error) -> Self {
        KVStoreError::IOError {
            message: err.to_string(),
        }
    }
}

/// Causal log errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] KVStoreError),

    /// A stored record could not be decoded.
    #[error("Corrupt log record: {0}")]
    Corrupt(String),

    /// The peer sent something that is not valid replication traffic.
    #[error("Replication protocol error: {0}")]
    Protocol(String),

    /// Socket failure during replication.
    #[error("Replication I/O error: {0}")]
    Io(String),

    /// Both ends of a replication session are the same log.
    #[error("Refusing to replicate log {0} with itself")]
    SelfReplication(String),

    /// The log was closed.
    #[error("Log is closed")]
    Closed,
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                LogError::Protocol(err.to_string())
            }
            _ => LogError::Io(err.to_string()),
        }
    }
}
