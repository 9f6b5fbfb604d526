//! # Shared Bus - Status Channel
//!
//! Operational notifications (peer connected, connection errors, handler
//! failures, ...) travel on their own channel, separate from the replicated
//! application events, so that an application event type can never collide
//! with an infrastructure notification.
//!
//! ```text
//! ┌──────────────┐    publish()     ┌──────────────┐   subscribe()   ┌──────────┐
//! │ Peer Manager │ ───────────────→ │  Status Bus  │ ──────────────→ │ Observer │
//! │ Dispatch     │                  │  (broadcast) │                 │          │
//! └──────────────┘                  └──────────────┘                 └──────────┘
//! ```
//!
//! The set of notifications is closed (`StatusEvent`). Publishing with no
//! subscribers is not an error: the event is dropped and counted.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{StatusEvent, StatusFilter, StatusTopic};
pub use publisher::{InMemoryStatusBus, StatusPublisher};
pub use subscriber::{StatusStream, StatusSubscription, SubscriptionError};

/// Maximum notifications buffered per subscriber before the oldest are
/// overwritten.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
