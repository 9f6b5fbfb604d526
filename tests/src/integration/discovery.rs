//! # Discovery Scenarios
//!
//! Listening nodes announce themselves on the bus; nodes that learn about a
//! peer through replication dial it.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use hb_02_causal_log::FileBackedKVStore;
    use hyper_emitter::{DecodedEvent, PeerKey};
    use serde_json::json;
    use shared_types::{EventPeer, EVENT_PEER_MESSAGE};
    use std::sync::Arc;

    fn announcements(events: &[DecodedEvent]) -> Vec<EventPeer> {
        events
            .iter()
            .filter(|e| e.name == EVENT_PEER_MESSAGE)
            .filter_map(|e| e.value().cloned())
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    #[tokio::test]
    async fn test_listen_announces_identity_and_address() {
        let node = node().await;
        let port = listen(&node).await;

        let announced = announcements(&history(&node).await);
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].id, node.get_id().await.unwrap());
        assert_eq!(announced[0].addresses[0].ip, LOOPBACK);
        assert_eq!(announced[0].addresses[0].port, u32::from(port));

        // own announcements never cause a self-connection
        tokio::time::sleep(SETTLE).await;
        assert!(node.peers().is_empty());
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_same_endpoint_is_announced_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.db");

        let first = node_over(Arc::new(FileBackedKVStore::open(&path).unwrap())).await;
        let port = listen(&first).await;
        first.close().await.unwrap();

        let second = node_over(Arc::new(FileBackedKVStore::open(&path).unwrap())).await;
        second.listen(port, Some(LOOPBACK)).await.unwrap();
        assert_eq!(announcements(&history(&second).await).len(), 1);
        second.close().await.unwrap();

        // a different endpoint is news
        let third = node_over(Arc::new(FileBackedKVStore::open(&path).unwrap())).await;
        listen(&third).await;
        assert_eq!(announcements(&history(&third).await).len(), 2);
        third.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_gossip_connects_to_announced_peer() {
        let hub = node().await;
        let hub_port = listen(&hub).await;

        // `far` only ever talks to the hub, but announces its endpoint
        let far = node().await;
        let far_port = listen(&far).await;
        far.connect(hub_port, LOOPBACK).await.unwrap();

        // `late` joins through the hub and learns about `far` from the log
        let late = node().await;
        let on_late = Recorder::attach(&late, "Test1");
        late.connect(hub_port, LOOPBACK).await.unwrap();

        let far_key = PeerKey::outbound(LOOPBACK, far_port);
        eventually(|| late.peer_state(&far_key).is_some()).await;

        far.emit("Test1", json!({"foo": "direct or relayed"})).await.unwrap();
        on_late.wait_exactly(1).await;

        for node in [hub, far, late] {
            node.close().await.unwrap();
        }
    }
}
