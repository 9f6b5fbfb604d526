//! # Causal Log Service

use crate::domain::entry::{keys, Heads, LogEntry, StoredEntry};
use crate::domain::errors::LogError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Published after every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Position {
    /// Local change position of the newest entry.
    pub changes: u64,
    pub closed: bool,
}

pub(crate) struct LogState {
    pub id: String,
    writer: Mutex<WriterState>,
}

struct WriterState {
    changes: u64,
    heads: Heads,
}

pub(crate) struct LogInner {
    pub store: Arc<dyn KeyValueStore>,
    pub state: OnceCell<LogState>,
    pub position: watch::Sender<Position>,
    pub closed: AtomicBool,
}

/// Append-only log with per-origin sequence numbers.
///
/// Cloning yields another handle onto the same log. State is loaded from the
/// store lazily, on the first operation (or an explicit [`CausalLog::ready`]).
#[derive(Clone)]
pub struct CausalLog {
    pub(crate) inner: Arc<LogInner>,
}

impl CausalLog {
    /// Create a log over `store`. Nothing is read until first use.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (position, _) = watch::channel(Position::default());
        Self {
            inner: Arc::new(LogInner {
                store,
                state: OnceCell::new(),
                position,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The store this log lives in.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.store
    }

    /// Load the log's state from the store, creating an id on first use.
    pub async fn ready(&self) -> Result<(), LogError> {
        self.state().await.map(|_| ())
    }

    pub(crate) async fn state(&self) -> Result<&LogState, LogError> {
        self.inner
            .state
            .get_or_try_init(|| async {
                let state = load(self.inner.store.as_ref()).await?;
                let changes = state.writer.lock().await.changes;
                self.inner.position.send_modify(|p| p.changes = changes);
                info!(id = %state.id, changes, "[hb-02] Causal log ready");
                Ok::<_, LogError>(state)
            })
            .await
    }

    /// This log's id.
    pub async fn id(&self) -> Result<String, LogError> {
        Ok(self.state().await?.id.clone())
    }

    /// Highest sequence number stored per origin.
    pub async fn heads(&self) -> Result<Heads, LogError> {
        Ok(self.state().await?.writer.lock().await.heads.clone())
    }

    /// Newest local change position, if the log has finished loading.
    #[must_use]
    pub fn position_now(&self) -> Option<u64> {
        self.inner
            .state
            .get()
            .map(|_| self.inner.position.borrow().changes)
    }

    /// Whether [`CausalLog::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), LogError> {
        if self.is_closed() {
            Err(LogError::Closed)
        } else {
            Ok(())
        }
    }

    /// Append a new entry originating at this log.
    pub async fn append(&self, value: Vec<u8>) -> Result<LogEntry, LogError> {
        self.ensure_open()?;
        let state = self.state().await?;
        let mut writer = state.writer.lock().await;
        let seq = writer.heads.get(&state.id).copied().unwrap_or(0) + 1;
        self.write(&mut writer, state.id.clone(), seq, value).await
    }

    /// Store an entry received from a peer.
    ///
    /// Returns `Ok(None)` when the entry is already present, or when it would
    /// leave a gap in its origin's sequence.
    pub async fn insert_replicated(
        &self,
        origin: String,
        seq: u64,
        value: Vec<u8>,
    ) -> Result<Option<LogEntry>, LogError> {
        self.ensure_open()?;
        let state = self.state().await?;
        let mut writer = state.writer.lock().await;
        let head = writer.heads.get(&origin).copied().unwrap_or(0);
        if seq <= head {
            return Ok(None);
        }
        if seq != head + 1 {
            warn!(%origin, seq, head, "[hb-02] Dropping out-of-order replicated entry");
            return Ok(None);
        }
        self.write(&mut writer, origin, seq, value).await.map(Some)
    }

    async fn write(
        &self,
        writer: &mut WriterState,
        origin: String,
        seq: u64,
        value: Vec<u8>,
    ) -> Result<LogEntry, LogError> {
        let change = writer.changes + 1;
        let mut heads = writer.heads.clone();
        heads.insert(origin.clone(), seq);

        let stored = StoredEntry {
            origin,
            seq,
            value,
        };
        let entry_bytes = encode(&stored)?;
        let heads_bytes = encode(&heads)?;

        self.inner
            .store
            .atomic_batch_write(vec![
                BatchOperation::put(keys::entry(change), entry_bytes),
                BatchOperation::put(keys::HEADS, heads_bytes),
                BatchOperation::put(keys::CHANGES, change.to_be_bytes().to_vec()),
            ])
            .await?;

        writer.changes = change;
        writer.heads = heads;
        self.inner.position.send_modify(|p| p.changes = change);
        debug!(change, origin = %stored.origin, seq, "[hb-02] Appended log entry");

        Ok(stored.into_entry(change))
    }

    /// Read the entry at a local change position.
    pub async fn get(&self, change: u64) -> Result<Option<LogEntry>, LogError> {
        self.ensure_open()?;
        self.state().await?;
        match self.inner.store.get(&keys::entry(change)).await? {
            Some(bytes) => {
                let stored: StoredEntry =
                    bincode::deserialize(&bytes).map_err(|e| LogError::Corrupt(e.to_string()))?;
                Ok(Some(stored.into_entry(change)))
            }
            None => Ok(None),
        }
    }

    /// Close the log and its store. Live feeds end. Idempotent.
    pub async fn close(&self) -> Result<(), LogError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.position.send_modify(|p| p.closed = true);
        self.inner.store.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for CausalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CausalLog")
            .field("id", &self.inner.state.get().map(|s| s.id.as_str()))
            .field("position", &*self.inner.position.borrow())
            .finish()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, LogError> {
    bincode::serialize(value).map_err(|e| LogError::Corrupt(e.to_string()))
}

async fn load(store: &dyn KeyValueStore) -> Result<LogState, LogError> {
    let id = match store.get(keys::LOG_ID).await? {
        Some(bytes) => String::from_utf8(bytes).map_err(|e| LogError::Corrupt(e.to_string()))?,
        None => {
            let id = Uuid::new_v4().to_string();
            store.put(keys::LOG_ID, id.as_bytes()).await?;
            id
        }
    };

    let changes = match store.get(keys::CHANGES).await? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| LogError::Corrupt("change counter is not 8 bytes".to_string()))?;
            u64::from_be_bytes(raw)
        }
        None => 0,
    };

    let heads = match store.get(keys::HEADS).await? {
        Some(bytes) => {
            bincode::deserialize(&bytes).map_err(|e| LogError::Corrupt(e.to_string()))?
        }
        None => Heads::new(),
    };

    Ok(LogState {
        id,
        writer: Mutex::new(WriterState { changes, heads }),
    })
}
