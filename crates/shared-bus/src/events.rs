//! # Status Events
//!
//! The closed set of operational notifications.

use serde::{Deserialize, Serialize};

/// Operational notifications published on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEvent {
    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    /// The log signalled readiness; dispatch and peer reconnection started.
    Ready,

    /// A listening endpoint was bound.
    ListenReady { addr: String },

    /// The instance finished closing.
    Closed,

    // =========================================================================
    // PEERS
    // =========================================================================
    /// A connection was established (inbound or outbound).
    PeerConnected { peer: String },

    /// A connection ended without error.
    PeerDisconnected { peer: String },

    /// An outbound connection attempt or replication session failed.
    /// `attempt` is zero when an established session broke.
    ConnectionError {
        peer: String,
        attempt: u32,
        error: String,
    },

    /// An inbound connection failed.
    PeerError { peer: String, error: String },

    /// An outbound peer exhausted its retry budget.
    ConnectFailed { peer: String, attempts: u32 },

    // =========================================================================
    // DISPATCH
    // =========================================================================
    /// A listener reported failure, panicked or dropped its completion.
    HandlerError { name: String, error: String },

    /// A log entry could not be decoded. `name` is absent when the envelope
    /// itself was malformed.
    DecodeError { name: Option<String>, error: String },

    // =========================================================================
    // STORAGE
    // =========================================================================
    /// A background storage operation failed.
    StorageError { error: String },
}

impl StatusEvent {
    /// Get the topic for this event (used for filtering).
    #[must_use]
    pub fn topic(&self) -> StatusTopic {
        match self {
            Self::Ready | Self::ListenReady { .. } | Self::Closed => StatusTopic::Lifecycle,
            Self::PeerConnected { .. }
            | Self::PeerDisconnected { .. }
            | Self::ConnectionError { .. }
            | Self::PeerError { .. }
            | Self::ConnectFailed { .. } => StatusTopic::Peers,
            Self::HandlerError { .. } | Self::DecodeError { .. } => StatusTopic::Dispatch,
            Self::StorageError { .. } => StatusTopic::Storage,
        }
    }
}

/// Topics for filtering status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusTopic {
    /// Readiness, listen and close notifications.
    Lifecycle,
    /// Connection lifecycle.
    Peers,
    /// Listener and decode failures.
    Dispatch,
    /// Storage failures outside a caller's request.
    Storage,
    /// All topics (wildcard).
    All,
}

/// Filter for subscribing to specific status events.
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<StatusTopic>,
}

impl StatusFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<StatusTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &StatusEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&StatusTopic::All)
            || self.topics.contains(&event.topic())
    }
}
