//! # File-Backed Store
//!
//! Durable key-value store kept in a single append-only file.
//!
//! ## Format
//!
//! The file is a sequence of framed batch records (little-endian):
//!
//! ```text
//! [body_len: u32] [crc32(body): u32] [body]
//! body = [count: u32] ( [op: u8] [key_len: u32] [key] ( [value_len: u32] [value] )? )*
//! ```
//!
//! `op` is `0` for a put (followed by the value) and `1` for a delete. A
//! failed append is cut off again with `set_len`. If that also fails, the
//! torn bytes fail their checksum on open and are skipped up to the next
//! intact record. Opening rewrites the file as a single compacted batch.
//!
//! The store holds an exclusive lock on `<path>.lock` until it is closed.

use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

/// `body_len` plus checksum.
const RECORD_HEADER_LEN: usize = 8;

struct FileState {
    data: HashMap<Vec<u8>, Vec<u8>>,
    file: Option<tokio::fs::File>,
    /// Length of the file up to the last complete record.
    len: u64,
}

/// Key-value store persisted to an append-only file.
pub struct FileBackedKVStore {
    path: PathBuf,
    lock: File,
    state: Mutex<FileState>,
    closed: AtomicBool,
}

impl FileBackedKVStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns `KVStoreError::Locked` if another handle holds the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if lock.try_lock_exclusive().is_err() {
            return Err(KVStoreError::Locked {
                path: lock_path.display().to_string(),
            });
        }

        let data = match std::fs::read(&path) {
            Ok(bytes) => decode_records(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), keys = data.len(), "[hb-02] Opened file-backed store");

        compact(&path, &data)?;
        let append = OpenOptions::new().append(true).create(true).open(&path)?;
        let len = append.metadata()?.len();

        Ok(Self {
            path,
            lock,
            state: Mutex::new(FileState {
                data,
                file: Some(tokio::fs::File::from_std(append)),
                len,
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<(), KVStoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(KVStoreError::Closed)
        } else {
            Ok(())
        }
    }

    async fn apply(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let record = encode_record(&operations);
        let committed = state.len;

        let file = state.file.as_mut().ok_or(KVStoreError::Closed)?;
        if let Err(e) = append_record(file, &record).await {
            if let Err(rollback) = file.set_len(committed).await {
                warn!(error = %rollback, "[hb-02] Could not cut off partial record");
            }
            return Err(e.into());
        }
        state.len = committed + record.len() as u64;

        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    state.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    state.data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

async fn append_record(file: &mut tokio::fs::File, record: &[u8]) -> std::io::Result<()> {
    file.write_all(record).await?;
    file.flush().await
}

impl std::fmt::Debug for FileBackedKVStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackedKVStore")
            .field("path", &self.path)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for FileBackedKVStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.ensure_open()?;
        Ok(self.state.lock().await.data.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.apply(vec![BatchOperation::put(key, value)]).await
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.apply(vec![BatchOperation::delete(key)]).await
    }

    async fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.apply(operations).await
    }

    async fn close(&self) -> Result<(), KVStoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        if let Some(mut file) = state.file.take() {
            file.sync_all().await?;
        }
        self.lock.unlock()?;
        debug!(path = %self.path.display(), "[hb-02] Closed file-backed store");
        Ok(())
    }
}

fn encode_record(operations: &[BatchOperation]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(operations.len() as u32).to_le_bytes());
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                body.push(OP_PUT);
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
                body.extend_from_slice(&(value.len() as u32).to_le_bytes());
                body.extend_from_slice(value);
            }
            BatchOperation::Delete { key } => {
                body.push(OP_DELETE);
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
            }
        }
    }

    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + body.len());
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    record.extend_from_slice(&body);
    record
}

/// Replay every intact record. Damaged bytes are skipped up to the next
/// record whose checksum matches; a damaged tail is dropped.
fn decode_records(bytes: &[u8]) -> HashMap<Vec<u8>, Vec<u8>> {
    let mut data = HashMap::new();
    let mut offset = 0;

    while offset < bytes.len() {
        if let Some((ops, used)) = read_record(&bytes[offset..]) {
            for op in ops {
                match op {
                    BatchOperation::Put { key, value } => {
                        data.insert(key, value);
                    }
                    BatchOperation::Delete { key } => {
                        data.remove(&key);
                    }
                }
            }
            offset += used;
            continue;
        }

        match (offset + 1..bytes.len()).find(|&next| read_record(&bytes[next..]).is_some()) {
            Some(next) => {
                warn!(offset, skipped = next - offset, "[hb-02] Skipping damaged record in store");
                offset = next;
            }
            None => {
                debug!(offset, "[hb-02] Ignoring truncated record at end of store");
                break;
            }
        }
    }

    data
}

/// One intact record at the start of `bytes`, with its encoded length.
fn read_record(bytes: &[u8]) -> Option<(Vec<BatchOperation>, usize)> {
    let mut reader = ByteReader { bytes, cursor: 0 };
    let len = reader.u32()? as usize;
    let checksum = reader.u32()?;
    let body = reader.take(len)?;
    if crc32fast::hash(body) != checksum {
        return None;
    }
    let ops = read_body(body)?;
    Some((ops, reader.cursor))
}

fn read_body(body: &[u8]) -> Option<Vec<BatchOperation>> {
    let mut reader = ByteReader {
        bytes: body,
        cursor: 0,
    };
    let count = reader.u32()? as usize;
    let mut ops = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let op = *reader.take(1)?.first()?;
        let key = reader.chunk()?;
        match op {
            OP_PUT => ops.push(BatchOperation::Put {
                key,
                value: reader.chunk()?,
            }),
            OP_DELETE => ops.push(BatchOperation::Delete { key }),
            _ => return None,
        }
    }
    (reader.remaining() == 0).then_some(ops)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let slice = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        let raw: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(u32::from_le_bytes(raw))
    }

    fn chunk(&mut self) -> Option<Vec<u8>> {
        let len = self.u32()? as usize;
        self.take(len).map(<[u8]>::to_vec)
    }
}

/// Rewrite the file as one batch of puts, atomically via a temp file.
fn compact(path: &Path, data: &HashMap<Vec<u8>, Vec<u8>>) -> Result<(), KVStoreError> {
    let operations: Vec<BatchOperation> = data
        .iter()
        .map(|(k, v)| BatchOperation::put(k.clone(), v.clone()))
        .collect();

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    if !operations.is_empty() {
        file.write_all(&encode_record(&operations))?;
    }
    file.sync_all()?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
