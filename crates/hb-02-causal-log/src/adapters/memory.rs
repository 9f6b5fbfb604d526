//! # In-Memory Store
//!
//! Volatile key-value store. Every clone is a separate *handle* onto the same
//! data: closing one handle does not affect the others, so a node can be
//! closed and reopened against the same in-memory store.

use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct InMemoryKVStore {
    data: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
    closed: AtomicBool,
}

impl InMemoryKVStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Whether this handle was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), KVStoreError> {
        if self.is_closed() {
            Err(KVStoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Clone for InMemoryKVStore {
    /// A new open handle onto the same data.
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKVStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.ensure_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.ensure_open()?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.ensure_open()?;
        self.data.write().remove(key);
        Ok(())
    }

    async fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.ensure_open()?;
        // Single write lock: readers see all or nothing
        let mut data = self.data.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), KVStoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
