//! Test fixtures shared by the integration scenarios.

use hb_01_codec_registry::CodecSource;
use hb_02_causal_log::{InMemoryKVStore, KeyValueStore};
use hyper_emitter::{Cursor, DecodedEvent, EmitterConfig, HyperEmitter, StatusEvent};
use parking_lot::Mutex;
use shared_bus::StatusSubscription;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Messages `Test1 {foo, num}` and `Test2 {bar, id}`.
pub const BASIC_SCHEMA: &str = include_str!("../../fixtures/basic.proto");

/// Upper bound for anything that depends on the network.
pub const WAIT: Duration = Duration::from_secs(5);

/// Time given to events that must NOT arrive.
pub const SETTLE: Duration = Duration::from_millis(200);

pub const LOOPBACK: &str = "127.0.0.1";

pub fn fast_config() -> EmitterConfig {
    EmitterConfig::default()
        .with_reconnect_timeout(Duration::from_millis(50))
        .with_max_connect_attempts(40)
}

/// A ready node with the basic schema.
pub async fn node_over(store: Arc<dyn KeyValueStore>) -> HyperEmitter {
    node_with(store, CodecSource::Schema(BASIC_SCHEMA.to_string())).await
}

pub async fn node_with(store: Arc<dyn KeyValueStore>, codecs: CodecSource) -> HyperEmitter {
    let node = HyperEmitter::new(store, codecs, fast_config()).unwrap();
    timeout(WAIT, node.ready()).await.unwrap().unwrap();
    node
}

/// A ready in-memory node with the basic schema.
pub async fn node() -> HyperEmitter {
    node_over(Arc::new(InMemoryKVStore::new())).await
}

/// Listen on an ephemeral loopback port.
pub async fn listen(node: &HyperEmitter) -> u16 {
    node.listen(0, Some(LOOPBACK)).await.unwrap().port()
}

/// Records every event of one name delivered to a node's listeners.
#[derive(Clone)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<DecodedEvent>>>,
}

impl Recorder {
    pub fn attach(node: &HyperEmitter, name: &str) -> Self {
        let recorder = Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let seen = Arc::clone(&recorder.seen);
        node.on_sync(name, move |event: &DecodedEvent| {
            seen.lock().push(event.clone());
            Ok(())
        });
        recorder
    }

    pub fn events(&self) -> Vec<DecodedEvent> {
        self.seen.lock().clone()
    }

    /// Wait until at least `count` events arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<DecodedEvent> {
        timeout(WAIT, async {
            while self.seen.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {} events, got {:?}", count, self.events()));
        self.events()
    }

    /// Wait for `count` events, then make sure no more follow.
    pub async fn wait_exactly(&self, count: usize) -> Vec<DecodedEvent> {
        self.wait_for(count).await;
        tokio::time::sleep(SETTLE).await;
        let events = self.events();
        assert_eq!(events.len(), count, "unexpected extra events: {:?}", events);
        events
    }
}

/// Skip status notifications until one matches.
pub async fn wait_status(
    status: &mut StatusSubscription,
    matches: impl Fn(&StatusEvent) -> bool,
) -> StatusEvent {
    timeout(WAIT, async {
        loop {
            match status.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("status channel closed"),
            }
        }
    })
    .await
    .unwrap()
}

/// Everything in a node's log, read from the beginning until it goes quiet.
pub async fn history(node: &HyperEmitter) -> Vec<DecodedEvent> {
    let mut stream = node.stream(Cursor::Beginning);
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(SETTLE, stream.reader.recv()).await {
        events.push(event);
    }
    events
}

/// Wait until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
