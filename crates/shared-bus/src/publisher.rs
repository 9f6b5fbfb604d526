//! # Status Publisher
//!
//! Defines the publishing side of the status channel.

use crate::events::{StatusEvent, StatusFilter};
use crate::subscriber::{StatusStream, StatusSubscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing status events.
///
/// Publishing never blocks and never fails; it is safe to call from
/// synchronous code paths such as drop handlers and dispatch callbacks.
pub trait StatusPublisher: Send + Sync {
    /// Publish an event.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the event.
    fn publish(&self, event: StatusEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the status channel.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
pub struct InMemoryStatusBus {
    /// Broadcast sender for events.
    sender: broadcast::Sender<StatusEvent>,

    /// Total events published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryStatusBus {
    /// Create a new status bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new status bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    ///
    /// Only events published after this call are received.
    #[must_use]
    pub fn subscribe(&self, filter: StatusFilter) -> StatusSubscription {
        debug!(topics = ?filter.topics, "[bus] New status subscription created");
        StatusSubscription::new(self.sender.subscribe(), filter)
    }

    /// Get a stream of events matching a filter.
    #[must_use]
    pub fn status_stream(&self, filter: StatusFilter) -> StatusStream {
        StatusStream::new(self.subscribe(filter))
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryStatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher for InMemoryStatusBus {
    fn publish(&self, event: StatusEvent) -> usize {
        let topic = event.topic();

        // Always increment counter (event was attempted)
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(topic = ?topic, receivers, "[bus] Status event published");
                receivers
            }
            Err(_) => {
                trace!(topic = ?topic, "[bus] Status event dropped (no subscribers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
