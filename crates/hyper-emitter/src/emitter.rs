//! # Hyper Emitter
//!
//! The public bus: emit events, listen for them, and replicate them with
//! other nodes.
//!
//! ## Startup Sequence
//!
//! `new` returns immediately and loads the log in the background:
//!
//! 1. Wait for the log to load
//! 2. Start dispatch at the current end of the log (history never refires)
//! 3. Signal ready (`ready()` resolves, `StatusEvent::Ready`)
//! 4. Reconnect to known peers, best effort
//!
//! Operations that touch the log or the network wait for step 3.

use crate::adapters::event_log::EventLog;
use crate::adapters::metadata::NodeMetadata;
use crate::config::EmitterConfig;
use crate::dispatch::{Completion, DispatchHandler, Handler, ListenerHandle, ListenerTable};
use crate::errors::{EmitterError, HandlerError};
use crate::lifecycle::TaskSet;
use crate::peers::{discovery, PeerManager, PeerState};
use crate::stream::BusStream;
use hb_01_codec_registry::{CodecBatch, CodecRegistry, CodecSource, SharedCodec};
use hb_02_causal_log::{CausalLog, KeyValueStore};
use shared_bus::{
    InMemoryStatusBus, StatusEvent, StatusFilter, StatusPublisher, StatusStream,
    StatusSubscription,
};
use shared_types::{Cursor, DecodedEvent, Payload, PeerKey, EVENT_PEER_MESSAGE};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Host used by `listen` when none is given.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Startup progress of an emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Ready,
    /// The log could not be loaded.
    Failed(String),
    Closed,
}

pub(crate) struct EmitterInner {
    pub(crate) config: EmitterConfig,
    pub(crate) log: EventLog,
    pub(crate) metadata: Arc<NodeMetadata>,
    pub(crate) listeners: ListenerTable,
    pub(crate) peers: PeerManager,
    pub(crate) status: Arc<InMemoryStatusBus>,
    pub(crate) ready: watch::Sender<ReadyState>,
    pub(crate) tasks: TaskSet,
    pub(crate) closing: AtomicBool,
}

/// A node of the replicated event bus. Clones share the node.
#[derive(Clone)]
pub struct HyperEmitter {
    pub(crate) inner: Arc<EmitterInner>,
}

impl HyperEmitter {
    /// Create a node over `store` and start loading it.
    ///
    /// Fails only when `codecs` holds a schema that does not compile. Must be
    /// called inside a tokio runtime.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        codecs: CodecSource,
        config: EmitterConfig,
    ) -> Result<Self, EmitterError> {
        let codecs = CodecRegistry::initialize(codecs)?;
        let causal = CausalLog::new(Arc::clone(&store));
        let log = EventLog::new(causal.clone(), codecs);
        let metadata = Arc::new(NodeMetadata::new(store));
        let status = Arc::new(InMemoryStatusBus::with_capacity(config.status_capacity));
        let peers = PeerManager::new(
            causal,
            Arc::clone(&metadata),
            Arc::clone(&status),
            config.clone(),
        );

        let listeners = ListenerTable::new();
        listeners.register(
            EVENT_PEER_MESSAGE,
            discovery::gossip_handler(peers.clone(), Arc::clone(&metadata)),
        );

        let (ready, _) = watch::channel(ReadyState::Pending);
        let emitter = Self {
            inner: Arc::new(EmitterInner {
                config,
                log,
                metadata,
                listeners,
                peers,
                status,
                ready,
                tasks: TaskSet::default(),
                closing: AtomicBool::new(false),
            }),
        };

        let startup = tokio::spawn(Arc::clone(&emitter.inner).start());
        emitter.inner.tasks.track("startup", startup);
        Ok(emitter)
    }

    /// Wait until the node is ready.
    pub async fn ready(&self) -> Result<(), EmitterError> {
        let mut state = self.inner.ready.subscribe();
        let state = state
            .wait_for(|state| *state != ReadyState::Pending)
            .await
            .map(|state| state.clone())
            .map_err(|_| EmitterError::Closed)?;

        match state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(reason) => Err(EmitterError::NotReady(reason)),
            ReadyState::Closed => Err(EmitterError::Closed),
            ReadyState::Pending => Err(EmitterError::NotReady("still starting".to_string())),
        }
    }

    /// Current startup state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.ready.borrow().clone()
    }

    /// Append an event to the log.
    ///
    /// Local listeners see it through the change feed, like events from
    /// peers. A decoded payload needs a codec registered for `name`.
    pub async fn emit(&self, name: &str, payload: impl Into<Payload>) -> Result<(), EmitterError> {
        self.ready().await?;
        if self.inner.closing.load(Ordering::Acquire) {
            return Err(EmitterError::Closed);
        }
        self.inner.log.append(name, payload.into()).await?;
        Ok(())
    }

    /// Register a synchronous listener for `name`.
    pub fn on_sync<F>(&self, name: impl Into<String>, handler: F) -> ListenerHandle
    where
        F: Fn(&DecodedEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.listeners.register(name, Handler::Sync(Arc::new(handler)))
    }

    /// Register an asynchronous listener for `name`. Dispatch waits until the
    /// `Completion` is consumed or dropped.
    pub fn on_async<F>(&self, name: impl Into<String>, handler: F) -> ListenerHandle
    where
        F: Fn(DecodedEvent, Completion) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .register(name, Handler::Async(Arc::new(handler)))
    }

    /// Remove the registration behind `handle`.
    pub fn remove_listener(&self, name: &str, handle: &ListenerHandle) -> Result<(), EmitterError> {
        self.inner.listeners.remove(name, handle)
    }

    /// Register (or replace) the codec for `name`.
    pub fn register_codec(&self, name: impl Into<String>, codec: SharedCodec) {
        self.inner.log.codecs().register(name, codec);
    }

    /// Register a list or map of codecs.
    pub fn register_codecs(&self, batch: impl Into<CodecBatch>) {
        self.inner.log.codecs().register_all(batch);
    }

    /// The live codec registry.
    #[must_use]
    pub fn codecs(&self) -> &CodecRegistry {
        self.inner.log.codecs()
    }

    /// This node's persisted identity.
    pub async fn get_id(&self) -> Result<String, EmitterError> {
        self.inner.metadata.id().await
    }

    /// Connect to the node listening on `host:port` and replicate with it.
    ///
    /// The peer is remembered and reconnected on the next start.
    pub async fn connect(&self, port: u16, host: &str) -> Result<(), EmitterError> {
        self.ready().await?;
        self.inner.peers.connect(host, port).await
    }

    /// Accept replication connections on `host:port` (all interfaces by
    /// default) and announce the endpoint to the bus.
    ///
    /// Returns the bound address; pass port 0 for an ephemeral port.
    pub async fn listen(&self, port: u16, host: Option<&str>) -> Result<SocketAddr, EmitterError> {
        self.ready().await?;
        let host = host.unwrap_or(DEFAULT_LISTEN_HOST);
        let addr = self.inner.peers.listen(host, port).await?;
        self.inner.status.publish(StatusEvent::ListenReady {
            addr: addr.to_string(),
        });

        discovery::announce(&self.inner.log, &self.inner.metadata, host, addr.port()).await?;
        Ok(addr)
    }

    /// Open a bidirectional stream reading from `cursor`.
    #[must_use]
    pub fn stream(&self, cursor: Cursor) -> BusStream {
        BusStream::open(
            self,
            self.inner.log.clone(),
            cursor,
            self.inner.config.stream_buffer,
        )
    }

    /// Subscribe to every status notification.
    #[must_use]
    pub fn status(&self) -> StatusSubscription {
        self.inner.status.subscribe(StatusFilter::all())
    }

    /// Subscribe to selected status topics.
    #[must_use]
    pub fn status_filtered(&self, filter: StatusFilter) -> StatusSubscription {
        self.inner.status.subscribe(filter)
    }

    /// Status notifications as a `Stream`.
    #[must_use]
    pub fn status_stream(&self, filter: StatusFilter) -> StatusStream {
        self.inner.status.status_stream(filter)
    }

    /// Live peer keys and their states.
    #[must_use]
    pub fn peers(&self) -> Vec<(PeerKey, PeerState)> {
        self.inner.peers.connections()
    }

    /// State of one peer key.
    #[must_use]
    pub fn peer_state(&self, key: &PeerKey) -> Option<PeerState> {
        self.inner.peers.state(key)
    }

    /// Drop the current connection with `key`. Outbound peers reconnect.
    pub fn reset_connection(&self, key: &PeerKey) -> bool {
        self.inner.peers.reset_connection(key)
    }

    /// Addresses this node listens on.
    #[must_use]
    pub fn listening(&self) -> Vec<SocketAddr> {
        self.inner.peers.listening()
    }

    #[must_use]
    pub fn config(&self) -> &EmitterConfig {
        &self.inner.config
    }
}

impl EmitterInner {
    async fn start(self: Arc<Self>) {
        if let Err(e) = self.load().await {
            error!(error = %e, "[emitter] Emitter failed to start");
            self.ready.send_replace(ReadyState::Failed(e.to_string()));
            self.status.publish(StatusEvent::StorageError {
                error: e.to_string(),
            });
            return;
        }

        let since = self.log.start_position(Cursor::Now).unwrap_or(0);
        let dispatch = DispatchHandler::new(
            self.log.feed(since),
            self.log.clone(),
            self.listeners.clone(),
            Arc::clone(&self.status),
        );
        self.tasks.track("dispatch", tokio::spawn(dispatch.run()));

        if self.closing.load(Ordering::Acquire) {
            return;
        }
        self.ready.send_replace(ReadyState::Ready);
        self.status.publish(StatusEvent::Ready);
        info!(since, "[emitter] Emitter ready");

        match self.metadata.known_peers().await {
            Ok(known) => {
                let reconnect = self.peers.reconnect_known(known);
                self.tasks.track("reconnect", reconnect);
            }
            Err(e) => {
                warn!(error = %e, "[emitter] Cannot load known peers");
                self.status.publish(StatusEvent::StorageError {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn load(&self) -> Result<(), EmitterError> {
        self.log.ready().await?;
        let id = self.metadata.id().await?;
        info!(%id, "[emitter] Node identity loaded");
        Ok(())
    }
}

impl fmt::Debug for HyperEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperEmitter")
            .field("state", &self.ready_state())
            .field("listeners", &self.inner.listeners)
            .field("peers", &self.inner.peers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hb_01_codec_registry::JsonCodec;
    use hb_02_causal_log::InMemoryKVStore;
    use parking_lot::Mutex;
    use serde_json::json;
    use shared_bus::StatusTopic;
    use std::time::Duration;
    use tokio::time::timeout;

    fn emitter_over(store: InMemoryKVStore) -> HyperEmitter {
        let emitter = HyperEmitter::new(
            Arc::new(store),
            CodecSource::None,
            EmitterConfig::default(),
        )
        .unwrap();
        emitter.register_codec("Json", Arc::new(JsonCodec));
        emitter
    }

    fn collect(emitter: &HyperEmitter, name: &str) -> Arc<Mutex<Vec<DecodedEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        emitter.on_sync(name, move |event: &DecodedEvent| {
            sink.lock().push(event.clone());
            Ok(())
        });
        seen
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<DecodedEvent>>>, count: usize) {
        timeout(Duration::from_secs(2), async {
            while seen.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_emit_reaches_listener() {
        let emitter = emitter_over(InMemoryKVStore::new());
        let seen = collect(&emitter, "Json");

        emitter.emit("Json", json!({"hello": "world"})).await.unwrap();
        wait_for(&seen, 1).await;
        assert_eq!(seen.lock()[0], DecodedEvent::new("Json", json!({"hello": "world"})));
        emitter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_async_listener_receives_event() {
        let emitter = emitter_over(InMemoryKVStore::new());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        emitter.on_async("Raw", move |event: DecodedEvent, completion: Completion| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event);
            }
            completion.done();
        });

        emitter.emit("Raw", vec![7u8]).await.unwrap();
        let event = timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert_eq!(event.payload, Payload::Raw(vec![7]));
        emitter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_does_not_refire_after_restart() {
        let store = InMemoryKVStore::new();
        let first = emitter_over(store.clone());
        first.emit("Json", json!({"n": 1})).await.unwrap();
        first.close().await.unwrap();

        let second = emitter_over(store.clone());
        let seen = collect(&second, "Json");
        second.ready().await.unwrap();
        second.emit("Json", json!({"n": 2})).await.unwrap();

        wait_for(&seen, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), vec![DecodedEvent::new("Json", json!({"n": 2}))]);
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_identity_survives_restart() {
        let store = InMemoryKVStore::new();
        let first = emitter_over(store.clone());
        let id = first.get_id().await.unwrap();
        first.close().await.unwrap();

        let second = emitter_over(store);
        assert_eq!(second.get_id().await.unwrap(), id);
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_codec_is_rejected() {
        let emitter = emitter_over(InMemoryKVStore::new());
        let result = emitter.emit("Nope", json!({})).await;
        assert_eq!(result, Err(EmitterError::MissingCodec("Nope".to_string())));
        emitter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let emitter = emitter_over(InMemoryKVStore::new());
        let mut lifecycle = emitter.status_filtered(StatusFilter::topics(vec![StatusTopic::Lifecycle]));
        emitter.ready().await.unwrap();

        emitter.close().await.unwrap();
        emitter.close().await.unwrap();

        assert_eq!(emitter.ready_state(), ReadyState::Closed);
        assert_eq!(emitter.emit("Json", json!({})).await, Err(EmitterError::Closed));

        let mut events = Vec::new();
        while let Ok(Some(event)) = lifecycle.try_recv() {
            events.push(event);
        }
        assert_eq!(events.last(), Some(&StatusEvent::Closed));
    }

    #[tokio::test]
    async fn test_close_before_ready() {
        let emitter = emitter_over(InMemoryKVStore::new());
        emitter.close().await.unwrap();
        assert_eq!(emitter.ready().await, Err(EmitterError::Closed));
    }

    #[tokio::test]
    async fn test_schema_codecs() {
        let schema = "message Test1 { optional string foo = 1; optional int32 num = 2; }";
        let emitter = HyperEmitter::new(
            Arc::new(InMemoryKVStore::new()),
            CodecSource::Schema(schema.to_string()),
            EmitterConfig::default(),
        )
        .unwrap();
        let seen = collect(&emitter, "Test1");

        emitter
            .emit("Test1", json!({"foo": "hello", "num": 42}))
            .await
            .unwrap();
        wait_for(&seen, 1).await;
        assert_eq!(seen.lock()[0].value(), Some(&json!({"foo": "hello", "num": 42})));
        emitter.close().await.unwrap();
    }

    #[test]
    fn test_invalid_schema_fails_construction() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let result = HyperEmitter::new(
            Arc::new(InMemoryKVStore::new()),
            CodecSource::Schema("message { nonsense".to_string()),
            EmitterConfig::default(),
        );
        assert!(matches!(result, Err(EmitterError::Codec(_))));
    }
}
