//! # Single Node Scenarios
//!
//! Codecs, listener registration and streams on one node with no peers.

#[cfg(test)]
mod tests {
    use crate::integration::support::*;
    use hb_01_codec_registry::{
        CodecSource, ProtoSchemaCompiler, SchemaCompiler, SharedCodec,
    };
    use hb_02_causal_log::InMemoryKVStore;
    use hyper_emitter::{
        Completion, Cursor, DecodedEvent, EmitterError, HandlerError, Payload, StatusEvent,
        StatusFilter, StatusTopic,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::time::timeout;

    // =========================================================================
    // CODECS
    // =========================================================================

    #[tokio::test]
    async fn test_round_trip_with_schema() {
        let node = node().await;
        let test1 = Recorder::attach(&node, "Test1");

        node.emit("Test1", json!({"foo": "hello", "num": 42}))
            .await
            .unwrap();

        let events = test1.wait_exactly(1).await;
        assert_eq!(events[0].value(), Some(&json!({"foo": "hello", "num": 42})));
        node.close().await.unwrap();
    }

    async fn assert_test2_decodes(node: &hyper_emitter::HyperEmitter) {
        let test2 = Recorder::attach(node, "Test2");
        node.emit("Test2", json!({"bar": "baz", "id": 7}))
            .await
            .unwrap();
        let events = test2.wait_for(1).await;
        assert_eq!(events[0].value(), Some(&json!({"bar": "baz", "id": 7})));
    }

    fn compiled() -> Vec<hb_01_codec_registry::NamedCodec> {
        ProtoSchemaCompiler::new().compile(BASIC_SCHEMA).unwrap()
    }

    #[tokio::test]
    async fn test_register_single_codec() {
        let node = node_with(Arc::new(InMemoryKVStore::new()), CodecSource::None).await;
        let test2 = compiled().into_iter().find(|c| c.name == "Test2").unwrap();

        node.register_codec("Test2", test2.codec);
        assert_test2_decodes(&node).await;
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_codec_list() {
        let node = node_with(Arc::new(InMemoryKVStore::new()), CodecSource::None).await;

        node.register_codecs(compiled());
        assert!(node.codecs().contains("Test1"));
        assert_test2_decodes(&node).await;
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_codec_map() {
        let node = node_with(Arc::new(InMemoryKVStore::new()), CodecSource::None).await;
        let map: HashMap<String, SharedCodec> = compiled()
            .into_iter()
            .map(|named| (named.name, named.codec))
            .collect();

        node.register_codecs(map);
        assert_test2_decodes(&node).await;
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_name_passes_through_raw() {
        let node = node().await;
        let raw = Recorder::attach(&node, "Opaque");

        node.emit("Opaque", vec![1u8, 2, 3]).await.unwrap();
        let events = raw.wait_for(1).await;
        assert_eq!(events[0].payload, Payload::Raw(vec![1, 2, 3]));
        node.close().await.unwrap();
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    #[tokio::test]
    async fn test_removed_listener_never_fires() {
        let node = node().await;
        let handle = node.on_sync("Test1", |_: &DecodedEvent| -> Result<(), HandlerError> {
            panic!("removed listener invoked")
        });
        node.remove_listener("Test1", &handle).unwrap();

        let kept = Recorder::attach(&node, "Test1");
        node.emit("Test1", json!({"foo": "x"})).await.unwrap();
        kept.wait_exactly(1).await;

        assert!(matches!(
            node.remove_listener("Test1", &handle),
            Err(EmitterError::ListenerNotFound { .. })
        ));
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_payloads_are_not_deduplicated() {
        let node = node().await;
        let test1 = Recorder::attach(&node, "Test1");

        let payload = json!({"foo": "same", "num": 1});
        node.emit("Test1", payload.clone()).await.unwrap();
        node.emit("Test1", payload).await.unwrap();

        test1.wait_exactly(2).await;
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_dispatch() {
        let node = node().await;
        let mut dispatch = node.status_filtered(StatusFilter::topics(vec![StatusTopic::Dispatch]));
        node.on_sync("Test1", |_: &DecodedEvent| -> Result<(), HandlerError> {
            Err(HandlerError::new("rejected"))
        });
        node.on_async("Test1", |_: DecodedEvent, completion: Completion| {
            completion.fail("also rejected");
        });
        let test1 = Recorder::attach(&node, "Test1");

        node.emit("Test1", json!({"num": 1})).await.unwrap();
        node.emit("Test1", json!({"num": 2})).await.unwrap();
        test1.wait_for(2).await;

        let first = wait_status(&mut dispatch, |e| matches!(e, StatusEvent::HandlerError { .. })).await;
        assert!(matches!(first, StatusEvent::HandlerError { ref name, .. } if name == "Test1"));
        node.close().await.unwrap();
    }

    // =========================================================================
    // STREAMS
    // =========================================================================

    #[tokio::test]
    async fn test_stream_from_beginning_replays_then_tails() {
        let node = node().await;
        for num in 1..=3 {
            node.emit("Test1", json!({"num": num})).await.unwrap();
        }

        let mut stream = node.stream(Cursor::Beginning);
        node.emit("Test1", json!({"num": 4})).await.unwrap();

        for num in 1..=4 {
            let event = timeout(WAIT, stream.reader.recv()).await.unwrap().unwrap();
            assert_eq!(event.value(), Some(&json!({"num": num})));
        }
        node.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_from_now_skips_history() {
        let node = node().await;
        node.emit("Test1", json!({"num": 1})).await.unwrap();

        let mut stream = node.stream(Cursor::Now);
        stream
            .writer
            .send(DecodedEvent::new("Test1", json!({"num": 2})))
            .await
            .unwrap();

        let event = timeout(WAIT, stream.reader.recv()).await.unwrap().unwrap();
        assert_eq!(event.value(), Some(&json!({"num": 2})));
        node.close().await.unwrap();
    }
}
