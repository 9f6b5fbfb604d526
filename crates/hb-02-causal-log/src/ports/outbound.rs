//! # Outbound Ports (Driven Ports)
//!
//! The storage engine the log (and node metadata) lives in.

use crate::domain::errors::KVStoreError;
use async_trait::async_trait;

/// Abstract interface for key-value database operations.
///
/// Production: `FileBackedKVStore`
/// Testing: `InMemoryKVStore`
///
/// A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, or NONE are.
    async fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Release the handle. Later operations fail with `KVStoreError::Closed`.
    async fn close(&self) -> Result<(), KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}
