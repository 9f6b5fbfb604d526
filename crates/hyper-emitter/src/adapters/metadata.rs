//! # Node Metadata
//!
//! Identity, known peers and the last self-announcement, stored next to the
//! log under the well-known keys of `shared_types::keys`. These writes are not
//! transactional with log appends.

use crate::errors::EmitterError;
use hb_02_causal_log::KeyValueStore;
use shared_types::{keys, EventPeer, KnownPeer};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Access to the persisted node metadata.
pub struct NodeMetadata {
    store: Arc<dyn KeyValueStore>,
    id: OnceCell<String>,
    /// Serializes known-peers rewrites.
    peers_lock: Mutex<()>,
}

impl NodeMetadata {
    /// Metadata kept in `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            id: OnceCell::new(),
            peers_lock: Mutex::new(()),
        }
    }

    /// This node's identity, created and persisted on first use.
    pub async fn id(&self) -> Result<String, EmitterError> {
        let id = self
            .id
            .get_or_try_init(|| async {
                if let Some(bytes) = self.store.get(keys::STORE_ID).await? {
                    return String::from_utf8(bytes).map_err(|e| {
                        EmitterError::Storage(format!("invalid node identity: {}", e))
                    });
                }
                let id = Uuid::new_v4().to_string();
                self.store.put(keys::STORE_ID, id.as_bytes()).await?;
                info!(%id, "[emitter] Created node identity");
                Ok(id)
            })
            .await?;
        Ok(id.clone())
    }

    /// Peers this node connected to before. A missing record is empty.
    pub async fn known_peers(&self) -> Result<Vec<KnownPeer>, EmitterError> {
        match self.store.get(keys::PEERS).await? {
            Some(bytes) => {
                KnownPeer::parse_list(&bytes).map_err(|e| EmitterError::Storage(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite the known-peers record.
    pub async fn save_known_peers(&self, peers: &[KnownPeer]) -> Result<(), EmitterError> {
        let _guard = self.peers_lock.lock().await;
        let json = serde_json::to_vec(peers).map_err(|e| EmitterError::Storage(e.to_string()))?;
        self.store.put(keys::PEERS, &json).await?;
        debug!(peers = peers.len(), "[emitter] Saved known peers");
        Ok(())
    }

    /// The last announcement this node gossiped. An unreadable record is
    /// treated as absent.
    pub async fn announcement(&self) -> Result<Option<EventPeer>, EmitterError> {
        let Some(bytes) = self.store.get(keys::MY_EVENT_PEER).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(peer) => Ok(Some(peer)),
            Err(e) => {
                warn!(error = %e, "[emitter] Ignoring unreadable self-announcement record");
                Ok(None)
            }
        }
    }

    /// Persist the announcement this node just gossiped.
    pub async fn save_announcement(&self, peer: &EventPeer) -> Result<(), EmitterError> {
        let json = serde_json::to_vec(peer).map_err(|e| EmitterError::Storage(e.to_string()))?;
        self.store.put(keys::MY_EVENT_PEER, &json).await?;
        Ok(())
    }
}

impl std::fmt::Debug for NodeMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetadata").field("id", &self.id.get()).finish()
    }
}
