//! # Hyper Emitter
//!
//! A replicated event bus. Events are appended to a causal log, delivered to
//! local listeners through the log's change feed, and replicated to every
//! connected node over TCP.
//!
//! ## Architecture
//!
//! ```text
//!  emit() ──→ Event Log ──→ Causal Log ←── replicate ──→ peers
//!                              │
//!                         change feed
//!                              │
//!             ┌────────────────┴───────────────┐
//!             ↓                                ↓
//!      Dispatch Pipeline                  Bus Streams
//!   (one entry at a time)            (independent readers)
//!             │
//!       on_sync / on_async
//! ```
//!
//! Operational notifications (peer lifecycle, listener failures, decode
//! failures) go to a separate status channel, see [`HyperEmitter::status`].
//!
//! ## Example
//!
//! ```no_run
//! use hyper_emitter::{EmitterConfig, HyperEmitter};
//! use hb_01_codec_registry::CodecSource;
//! use hb_02_causal_log::InMemoryKVStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), hyper_emitter::EmitterError> {
//! let schema = "message Hello { optional string who = 1; }".to_string();
//! let bus = HyperEmitter::new(
//!     Arc::new(InMemoryKVStore::new()),
//!     CodecSource::Schema(schema),
//!     EmitterConfig::default(),
//! )?;
//! bus.on_sync("Hello", |event: &hyper_emitter::DecodedEvent| {
//!     println!("{:?}", event.value());
//!     Ok(())
//! });
//! bus.emit("Hello", serde_json::json!({"who": "world"})).await?;
//! bus.listen(9901, None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - `adapters/` - Envelope codec over the log, node metadata records
//! - `dispatch/` - Listener table and the delivery pipeline
//! - `peers/` - Connections, retries and discovery
//! - `stream` - Bidirectional bus streams
//! - `lifecycle` - Background tasks and teardown

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod emitter;
pub mod errors;
pub mod lifecycle;
pub mod peers;
pub mod stream;

pub use config::{ConfigError, EmitterConfig};
pub use dispatch::{Completion, ListenerHandle};
pub use emitter::{HyperEmitter, ReadyState, DEFAULT_LISTEN_HOST};
pub use errors::{EmitterError, HandlerError};
pub use peers::PeerState;
pub use stream::{BusStream, StreamReader, StreamWriter};

pub use shared_bus::{StatusEvent, StatusFilter, StatusTopic};
pub use shared_types::{Cursor, DecodedEvent, Payload, PeerKey};
