//! # Listener Table
//!
//! Ordered handler lists per event name. Every registration gets a unique
//! handle, which is the only way to remove it.

use crate::dispatch::completion::Completion;
use crate::errors::{EmitterError, HandlerError};
use parking_lot::RwLock;
use shared_types::DecodedEvent;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Synchronous listener: returns when done.
pub type SyncHandler = dyn Fn(&DecodedEvent) -> Result<(), HandlerError> + Send + Sync;

/// Asynchronous listener: signals the `Completion` when done.
pub type AsyncHandler = dyn Fn(DecodedEvent, Completion) + Send + Sync;

/// A registered listener, tagged with its kind.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Identifies one registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    name: String,
    id: u64,
}

impl ListenerHandle {
    /// The event name the listener was registered for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration number, unique per emitter.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Name -> ordered handlers.
#[derive(Clone, Default)]
pub struct ListenerTable {
    table: Arc<RwLock<HashMap<String, Vec<(u64, Handler)>>>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `name`.
    pub fn register(&self, name: impl Into<String>, handler: Handler) -> ListenerHandle {
        let name = name.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.table
            .write()
            .entry(name.clone())
            .or_default()
            .push((id, handler));
        ListenerHandle { name, id }
    }

    /// Remove exactly the registration behind `handle` from `name`.
    pub fn remove(&self, name: &str, handle: &ListenerHandle) -> Result<(), EmitterError> {
        let not_found = || EmitterError::ListenerNotFound {
            name: name.to_string(),
            id: handle.id,
        };
        if handle.name != name {
            return Err(not_found());
        }

        let mut table = self.table.write();
        let handlers = table.get_mut(name).ok_or_else(not_found)?;
        let index = handlers
            .iter()
            .position(|(id, _)| *id == handle.id)
            .ok_or_else(not_found)?;
        handlers.remove(index);
        if handlers.is_empty() {
            table.remove(name);
        }
        Ok(())
    }

    /// Handlers for `name`, in registration order.
    #[must_use]
    pub fn handlers(&self, name: &str) -> Vec<Handler> {
        self.table
            .read()
            .get(name)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of handlers for `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.table.read().get(name).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        let mut names: Vec<_> = table.iter().map(|(n, h)| (n.clone(), h.len())).collect();
        names.sort();
        f.debug_struct("ListenerTable").field("listeners", &names).finish()
    }
}
