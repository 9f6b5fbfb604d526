//! # Peer Manager
//!
//! Owns every socket of a node. Each connection runs the log's replicate
//! primitive directly; this module deduplicates by peer key, schedules
//! retries and reports connection lifecycle on the status channel.
//!
//! ## Outbound State Machine
//!
//! ```text
//! connect() ──→ Connecting ──ok──→ Connected ──drop──┐
//!                   ↑  │                             │
//!                   │  └──error──→ Retrying ←────────┘
//!                   └──── after reconnect_timeout ───┘
//!
//! Retrying with the attempt budget spent ──→ removed (ConnectFailed)
//! ```
//!
//! The attempt counter restarts after every successful connection.

use crate::adapters::metadata::NodeMetadata;
use crate::config::EmitterConfig;
use crate::errors::EmitterError;
use futures::future::join_all;
use hb_02_causal_log::{CausalLog, LogError};
use parking_lot::Mutex;
use shared_bus::{InMemoryStatusBus, StatusEvent, StatusPublisher};
use shared_types::{KnownPeer, PeerKey};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Connection state of a live peer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Dialing.
    Connecting,
    /// Replicating over an open socket.
    Connected,
    /// Waiting `reconnect_timeout` before the next attempt.
    Retrying,
}

struct PeerSlot {
    state: PeerState,
    task: JoinHandle<()>,
    /// Ends the current session without stopping retries.
    kill: Arc<Notify>,
}

type ConnectReply = oneshot::Sender<Result<(), EmitterError>>;

enum SessionEnd {
    /// The remote closed the stream (or the log was closed).
    Clean,
    Failed(LogError),
    /// Ended through `reset_connection`.
    Reset,
}

struct PeerInner {
    log: CausalLog,
    metadata: Arc<NodeMetadata>,
    status: Arc<InMemoryStatusBus>,
    config: EmitterConfig,
    peers: Mutex<HashMap<PeerKey, PeerSlot>>,
    listeners: Mutex<Vec<(SocketAddr, JoinHandle<()>)>>,
    next_inbound: AtomicU64,
    closing: AtomicBool,
}

/// Live connection table of a node.
#[derive(Clone)]
pub struct PeerManager {
    inner: Arc<PeerInner>,
}

impl PeerManager {
    /// Create a manager replicating `log`.
    pub fn new(
        log: CausalLog,
        metadata: Arc<NodeMetadata>,
        status: Arc<InMemoryStatusBus>,
        config: EmitterConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                log,
                metadata,
                status,
                config,
                peers: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_inbound: AtomicU64::new(0),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Connect to `host:port` and keep replicating with it, reconnecting
    /// after failures.
    ///
    /// Resolves once the first connection is established, or with
    /// `EmitterError::Connection` when the attempt budget runs out. A key
    /// that is already connecting, connected or retrying resolves
    /// immediately.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), EmitterError> {
        if self.inner.is_closing() {
            return Err(EmitterError::Closed);
        }
        let key = PeerKey::outbound(host, port);
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.inner.start_outbound(key.clone(), reply_tx) {
            debug!(peer = %key, "[peers] Already connected or connecting");
            return Ok(());
        }
        reply_rx.await.unwrap_or(Err(EmitterError::Closed))
    }

    /// Reconnect to every known peer in the background. Failures only show
    /// on the status channel.
    pub fn reconnect_known(&self, known: Vec<KnownPeer>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            if known.is_empty() {
                return;
            }
            let attempts = known
                .iter()
                .map(|peer| manager.connect(&peer.address, peer.port));
            let results = join_all(attempts).await;
            let connected = results.iter().filter(|r| r.is_ok()).count();
            info!(known = results.len(), connected, "[peers] Reconnected to known peers");
        })
    }

    /// Bind a listening endpoint and replicate with everyone who connects.
    pub async fn listen(&self, host: &str, port: u16) -> Result<SocketAddr, EmitterError> {
        if self.inner.is_closing() {
            return Err(EmitterError::Closed);
        }
        let listen_error = |e: std::io::Error| EmitterError::Listen {
            addr: format!("{}:{}", host, port),
            reason: e.to_string(),
        };

        let listener = TcpListener::bind((host, port)).await.map_err(listen_error)?;
        let local = listener.local_addr().map_err(listen_error)?;

        let task = tokio::spawn(Arc::clone(&self.inner).accept_loop(listener));
        self.inner.listeners.lock().push((local, task));
        info!(addr = %local, "[peers] Listening");
        Ok(local)
    }

    /// State of a live peer key.
    #[must_use]
    pub fn state(&self, key: &PeerKey) -> Option<PeerState> {
        self.inner.peers.lock().get(key).map(|slot| slot.state)
    }

    /// Every live peer key with its state, sorted by key.
    #[must_use]
    pub fn connections(&self) -> Vec<(PeerKey, PeerState)> {
        let mut connections: Vec<_> = self
            .inner
            .peers
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.state))
            .collect();
        connections.sort_by(|a, b| a.0.cmp(&b.0));
        connections
    }

    /// Bound addresses of the listening endpoints.
    #[must_use]
    pub fn listening(&self) -> Vec<SocketAddr> {
        self.inner.listeners.lock().iter().map(|(addr, _)| *addr).collect()
    }

    /// Drop the current session with `key`, as if the socket broke.
    /// Outbound peers reconnect as usual.
    pub fn reset_connection(&self, key: &PeerKey) -> bool {
        match self.inner.peers.lock().get(key) {
            Some(slot) => {
                slot.kill.notify_one();
                true
            }
            None => false,
        }
    }

    /// Stop accepting: abort every listening endpoint and wait until the
    /// sockets are released.
    pub async fn close_listeners(&self) -> usize {
        self.inner.closing.store(true, Ordering::Release);
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        let count = listeners.len();
        let tasks = listeners.into_iter().map(|(addr, task)| {
            task.abort();
            debug!(%addr, "[peers] Listener closed");
            task
        });
        join_all(tasks).await;
        count
    }

    /// Forcefully drop every inbound and outbound connection.
    pub async fn close_connections(&self) -> usize {
        self.inner.closing.store(true, Ordering::Release);
        let peers = std::mem::take(&mut *self.inner.peers.lock());
        let count = peers.len();
        let tasks = peers.into_iter().map(|(key, slot)| {
            slot.task.abort();
            debug!(peer = %key, "[peers] Connection aborted");
            slot.task
        });
        join_all(tasks).await;
        count
    }
}

impl PeerInner {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn set_state(&self, key: &PeerKey, state: PeerState) {
        if let Some(slot) = self.peers.lock().get_mut(key) {
            slot.state = state;
        }
    }

    /// Register `key` and spawn its supervisor, unless it is already live.
    fn start_outbound(self: &Arc<Self>, key: PeerKey, reply: ConnectReply) -> bool {
        let mut peers = self.peers.lock();
        if peers.contains_key(&key) {
            return false;
        }
        let kill = Arc::new(Notify::new());
        let task = tokio::spawn(Arc::clone(self).supervise(key.clone(), Arc::clone(&kill), reply));
        peers.insert(
            key,
            PeerSlot {
                state: PeerState::Connecting,
                task,
                kill,
            },
        );
        true
    }

    async fn supervise(self: Arc<Self>, key: PeerKey, kill: Arc<Notify>, reply: ConnectReply) {
        let PeerKey::Outbound { host, port } = key.clone() else {
            return;
        };
        let peer = key.to_string();
        let mut reply = Some(reply);
        let mut attempt: u32 = 0;

        loop {
            if self.is_closing() {
                break;
            }
            attempt += 1;
            self.set_state(&key, PeerState::Connecting);

            match TcpStream::connect((host.as_str(), port)).await {
                Ok(socket) => {
                    attempt = 0;
                    if let Err(e) = socket.set_nodelay(true) {
                        debug!(%peer, error = %e, "[peers] Cannot set TCP_NODELAY");
                    }
                    self.set_state(&key, PeerState::Connected);
                    info!(%peer, "[peers] Connected");
                    self.status.publish(StatusEvent::PeerConnected { peer: peer.clone() });
                    self.remember_peers().await;
                    if let Some(reply) = reply.take() {
                        let _ = reply.send(Ok(()));
                    }

                    match self.session(socket, &kill).await {
                        SessionEnd::Clean => {
                            info!(%peer, "[peers] Disconnected");
                            self.status
                                .publish(StatusEvent::PeerDisconnected { peer: peer.clone() });
                        }
                        SessionEnd::Failed(LogError::SelfReplication(id)) => {
                            warn!(%peer, log = %id, "[peers] Peer is this node, not reconnecting");
                            self.status.publish(StatusEvent::ConnectionError {
                                peer: peer.clone(),
                                attempt: 0,
                                error: LogError::SelfReplication(id).to_string(),
                            });
                            break;
                        }
                        SessionEnd::Failed(e) => {
                            warn!(%peer, error = %e, "[peers] Replication failed");
                            self.status.publish(StatusEvent::ConnectionError {
                                peer: peer.clone(),
                                attempt: 0,
                                error: e.to_string(),
                            });
                        }
                        SessionEnd::Reset => {
                            debug!(%peer, "[peers] Connection reset");
                            self.status.publish(StatusEvent::ConnectionError {
                                peer: peer.clone(),
                                attempt: 0,
                                error: "connection reset".to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!(%peer, attempt, error = %e, "[peers] Connection attempt failed");
                    self.status.publish(StatusEvent::ConnectionError {
                        peer: peer.clone(),
                        attempt,
                        error: e.to_string(),
                    });

                    if attempt >= self.config.max_connect_attempts {
                        error!(%peer, attempts = attempt, "[peers] Giving up on peer");
                        self.status.publish(StatusEvent::ConnectFailed {
                            peer: peer.clone(),
                            attempts: attempt,
                        });
                        if let Some(reply) = reply.take() {
                            let _ = reply.send(Err(EmitterError::Connection {
                                peer: peer.clone(),
                                message: e.to_string(),
                            }));
                        }
                        break;
                    }
                }
            }

            if self.is_closing() {
                break;
            }
            self.set_state(&key, PeerState::Retrying);
            tokio::time::sleep(self.config.reconnect_timeout).await;
        }

        self.peers.lock().remove(&key);
        if let Some(reply) = reply.take() {
            let _ = reply.send(Err(EmitterError::Closed));
        }
    }

    async fn session(&self, socket: TcpStream, kill: &Notify) -> SessionEnd {
        tokio::select! {
            result = self.log.replicate(socket) => match result {
                Ok(()) => SessionEnd::Clean,
                Err(e) => SessionEnd::Failed(e),
            },
            _ = kill.notified() => SessionEnd::Reset,
        }
    }

    /// Overwrite the known-peers record with the live outbound keys.
    async fn remember_peers(&self) {
        let known: Vec<KnownPeer> = {
            let peers = self.peers.lock();
            let mut keys: Vec<&PeerKey> = peers.keys().collect();
            keys.sort();
            keys.into_iter().filter_map(PeerKey::as_known_peer).collect()
        };
        if let Err(e) = self.metadata.save_known_peers(&known).await {
            warn!(error = %e, "[peers] Cannot persist known peers");
            self.status.publish(StatusEvent::StorageError {
                error: e.to_string(),
            });
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, remote)) => {
                    if self.is_closing() {
                        break;
                    }
                    self.start_inbound(socket, remote);
                }
                Err(e) => {
                    warn!(error = %e, "[peers] Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn start_inbound(self: &Arc<Self>, socket: TcpStream, remote: SocketAddr) {
        let key = PeerKey::Inbound(self.next_inbound.fetch_add(1, Ordering::Relaxed));
        let kill = Arc::new(Notify::new());
        let mut peers = self.peers.lock();
        let task = tokio::spawn(Arc::clone(self).serve_inbound(
            key.clone(),
            socket,
            remote,
            Arc::clone(&kill),
        ));
        peers.insert(
            key,
            PeerSlot {
                state: PeerState::Connected,
                task,
                kill,
            },
        );
    }

    async fn serve_inbound(
        self: Arc<Self>,
        key: PeerKey,
        socket: TcpStream,
        remote: SocketAddr,
        kill: Arc<Notify>,
    ) {
        let peer = key.to_string();
        info!(%peer, %remote, "[peers] Accepted connection");
        self.status.publish(StatusEvent::PeerConnected { peer: peer.clone() });

        match self.session(socket, &kill).await {
            SessionEnd::Clean => {
                info!(%peer, "[peers] Disconnected");
                self.status.publish(StatusEvent::PeerDisconnected { peer });
            }
            SessionEnd::Failed(e) => {
                warn!(%peer, %remote, error = %e, "[peers] Inbound replication failed");
                self.status.publish(StatusEvent::PeerError {
                    peer,
                    error: e.to_string(),
                });
            }
            SessionEnd::Reset => {
                self.status.publish(StatusEvent::PeerError {
                    peer,
                    error: "connection reset".to_string(),
                });
            }
        }

        self.peers.lock().remove(&key);
    }
}

impl std::fmt::Debug for PeerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerManager")
            .field("connections", &self.connections())
            .field("listening", &self.listening())
            .finish()
    }
}
