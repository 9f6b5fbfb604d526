//! # Replication Scenarios
//!
//! Two and three nodes over loopback TCP, restarts over shared stores and
//! connection failures.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use hb_02_causal_log::{FileBackedKVStore, InMemoryKVStore};
    use hyper_emitter::{EmitterConfig, EmitterError, HyperEmitter, PeerKey, PeerState, StatusEvent};
    use hb_01_codec_registry::CodecSource;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    // =========================================================================
    // TOPOLOGIES
    // =========================================================================

    #[tokio::test]
    async fn test_paired_nodes_see_each_others_events_once() {
        let a = node().await;
        let b = node().await;
        let on_a = Recorder::attach(&a, "Test1");
        let on_b = Recorder::attach(&b, "Test1");

        let port = listen(&a).await;
        b.connect(port, LOOPBACK).await.unwrap();

        a.emit("Test1", json!({"foo": "from a"})).await.unwrap();
        b.emit("Test1", json!({"foo": "from b"})).await.unwrap();

        let seen_a = on_a.wait_exactly(2).await;
        let seen_b = on_b.wait_exactly(2).await;
        for seen in [seen_a, seen_b] {
            let mut values: Vec<_> = seen.iter().filter_map(|e| e.value().cloned()).collect();
            values.sort_by_key(|v| v.to_string());
            assert_eq!(values, vec![json!({"foo": "from a"}), json!({"foo": "from b"})]);
        }

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_three_node_chain_relays() {
        let a = node().await;
        let b = node().await;
        let c = node().await;
        let on_c = Recorder::attach(&c, "Test2");

        let a_port = listen(&a).await;
        let b_port = listen(&b).await;
        b.connect(a_port, LOOPBACK).await.unwrap();
        c.connect(b_port, LOOPBACK).await.unwrap();

        a.emit("Test2", json!({"bar": "relayed", "id": 3})).await.unwrap();

        let events = on_c.wait_exactly(1).await;
        assert_eq!(events[0].value(), Some(&json!({"bar": "relayed", "id": 3})));

        for node in [a, b, c] {
            node.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_history_is_exchanged_on_connect() {
        let a = node().await;
        a.emit("Test1", json!({"num": 1})).await.unwrap();
        a.emit("Test1", json!({"num": 2})).await.unwrap();
        let port = listen(&a).await;

        let b = node().await;
        let on_b = Recorder::attach(&b, "Test1");
        b.connect(port, LOOPBACK).await.unwrap();

        let events = on_b.wait_exactly(2).await;
        assert_eq!(events[0].value(), Some(&json!({"num": 1})));
        assert_eq!(events[1].value(), Some(&json!({"num": 2})));

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    // =========================================================================
    // RESTARTS
    // =========================================================================

    #[tokio::test]
    async fn test_offline_peer_catches_up_after_restart() {
        let a = node().await;
        let port = listen(&a).await;

        let b_store = InMemoryKVStore::new();
        let b = node_over(Arc::new(b_store.clone())).await;
        b.connect(port, LOOPBACK).await.unwrap();
        b.close().await.unwrap();

        a.emit("Test1", json!({"foo": "while offline", "num": 1})).await.unwrap();
        a.emit("Test1", json!({"foo": "while offline", "num": 2})).await.unwrap();

        // the known peer is dialed again on startup
        let b = HyperEmitter::new(
            Arc::new(b_store),
            CodecSource::Schema(BASIC_SCHEMA.to_string()),
            fast_config(),
        )
        .unwrap();
        let on_b = Recorder::attach(&b, "Test1");

        let events = on_b.wait_exactly(2).await;
        assert_eq!(events[1].value(), Some(&json!({"foo": "while offline", "num": 2})));
        assert_eq!(
            b.peer_state(&PeerKey::outbound(LOOPBACK, port)),
            Some(PeerState::Connected)
        );

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_does_not_refire_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.db");

        let first = node_over(Arc::new(FileBackedKVStore::open(&path).unwrap())).await;
        first.emit("Test1", json!({"num": 1})).await.unwrap();
        let id = first.get_id().await.unwrap();
        first.close().await.unwrap();

        let second = node_over(Arc::new(FileBackedKVStore::open(&path).unwrap())).await;
        let on_second = Recorder::attach(&second, "Test1");
        second.emit("Test1", json!({"num": 2})).await.unwrap();

        let events = on_second.wait_exactly(1).await;
        assert_eq!(events[0].value(), Some(&json!({"num": 2})));
        assert_eq!(second.get_id().await.unwrap(), id);

        let replayed: Vec<_> = history(&second)
            .await
            .into_iter()
            .filter(|e| e.name == "Test1")
            .collect();
        assert_eq!(replayed.len(), 2);
        second.close().await.unwrap();
    }

    // =========================================================================
    // CONNECTION FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_reconnects_after_connection_loss() {
        let a = node().await;
        let b = node().await;
        let on_b = Recorder::attach(&b, "Test1");
        let port = listen(&a).await;
        b.connect(port, LOOPBACK).await.unwrap();

        let key = PeerKey::outbound(LOOPBACK, port);
        let mut status = b.status();
        assert!(b.reset_connection(&key));

        let lost = wait_status(&mut status, |e| matches!(e, StatusEvent::ConnectionError { .. })).await;
        assert!(matches!(lost, StatusEvent::ConnectionError { attempt: 0, .. }));
        wait_status(&mut status, |e| matches!(e, StatusEvent::PeerConnected { .. })).await;

        a.emit("Test1", json!({"foo": "after reconnect"})).await.unwrap();
        on_b.wait_exactly(1).await;

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_peer_exhausts_budget() {
        let config = EmitterConfig::default()
            .with_reconnect_timeout(Duration::from_millis(10))
            .with_max_connect_attempts(3);
        let node = HyperEmitter::new(
            Arc::new(InMemoryKVStore::new()),
            CodecSource::None,
            config,
        )
        .unwrap();
        let mut status = node.status();

        let port = {
            let probe = std::net::TcpListener::bind((LOOPBACK, 0)).unwrap();
            probe.local_addr().unwrap().port()
        };
        let result = timeout(WAIT, node.connect(port, LOOPBACK)).await.unwrap();
        assert!(matches!(result, Err(EmitterError::Connection { .. })));

        let failed = wait_status(&mut status, |e| matches!(e, StatusEvent::ConnectFailed { .. })).await;
        assert!(matches!(failed, StatusEvent::ConnectFailed { attempts: 3, .. }));
        assert!(node.peers().is_empty());
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_connect_keeps_one_connection() {
        let a = node().await;
        let b = node().await;
        let port = listen(&a).await;

        b.connect(port, LOOPBACK).await.unwrap();
        b.connect(port, LOOPBACK).await.unwrap();

        let outbound: Vec<_> = b
            .peers()
            .into_iter()
            .filter(|(key, _)| matches!(key, PeerKey::Outbound { .. }))
            .collect();
        assert_eq!(outbound.len(), 1);
        eventually(|| a.peers().len() == 1).await;

        a.close().await.unwrap();
        b.close().await.unwrap();
    }
}
