//! # Dispatch Pipeline
//!
//! Drains the change feed one entry at a time. All handlers for an entry run
//! concurrently and the next entry is read only after every one of them has
//! finished, so a stuck handler stalls the bus instead of reordering it.

use crate::adapters::event_log::EventLog;
use crate::dispatch::completion::Completion;
use crate::dispatch::listeners::{Handler, ListenerTable};
use crate::errors::HandlerError;
use futures::future::join_all;
use futures::StreamExt;
use hb_02_causal_log::{ChangeFeed, LogEntry};
use shared_bus::{InMemoryStatusBus, StatusEvent, StatusPublisher};
use shared_types::DecodedEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Delivers log entries to local listeners.
pub struct DispatchHandler {
    feed: ChangeFeed,
    log: EventLog,
    listeners: ListenerTable,
    status: Arc<InMemoryStatusBus>,
}

impl DispatchHandler {
    /// Create a handler draining `feed`.
    pub fn new(
        feed: ChangeFeed,
        log: EventLog,
        listeners: ListenerTable,
        status: Arc<InMemoryStatusBus>,
    ) -> Self {
        Self {
            feed,
            log,
            listeners,
            status,
        }
    }

    /// Run until the feed ends (the log was closed).
    pub async fn run(mut self) {
        info!("[dispatch] Listener dispatch started");

        while let Some(next) = self.feed.next().await {
            match next {
                Ok(entry) => self.dispatch(&entry).await,
                Err(e) => {
                    warn!(error = %e, "[dispatch] Change feed failed");
                    self.status.publish(StatusEvent::StorageError {
                        error: e.to_string(),
                    });
                }
            }
        }

        info!("[dispatch] Change feed ended, exiting");
    }

    async fn dispatch(&mut self, entry: &LogEntry) {
        let event = match self.log.decode(entry) {
            Ok(event) => event,
            Err(failure) => {
                warn!(change = entry.change, error = %failure.error, "[dispatch] Cannot decode entry");
                self.status.publish(failure.into());
                return;
            }
        };

        let handlers = self.listeners.handlers(&event.name);
        if handlers.is_empty() {
            return;
        }
        debug!(name = %event.name, handlers = handlers.len(), change = entry.change, "[dispatch] Delivering event");

        let results = join_all(handlers.into_iter().map(|handler| invoke(handler, &event))).await;
        for error in results.into_iter().filter_map(Result::err) {
            warn!(name = %event.name, %error, "[dispatch] Listener failed");
            self.status.publish(StatusEvent::HandlerError {
                name: event.name.clone(),
                error: error.to_string(),
            });
        }
    }
}

/// Run one handler to completion.
async fn invoke(handler: Handler, event: &DecodedEvent) -> Result<(), HandlerError> {
    match handler {
        Handler::Sync(handler) => match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(result) => result,
            Err(panic) => Err(panic_error(panic)),
        },
        Handler::Async(handler) => {
            let (completion, done) = Completion::new();
            let event = event.clone();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event, completion))) {
                return Err(panic_error(panic));
            }
            match done.await {
                Ok(result) => result,
                Err(_) => Err(HandlerError::new("listener dropped its completion")),
            }
        }
    }
}

fn panic_error(panic: Box<dyn std::any::Any + Send>) -> HandlerError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    HandlerError::new(format!("listener panicked: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hb_01_codec_registry::{CodecRegistry, CodecSource};
    use hb_02_causal_log::{CausalLog, InMemoryKVStore};
    use parking_lot::Mutex;
    use shared_bus::StatusFilter;
    use shared_types::Payload;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        log: EventLog,
        listeners: ListenerTable,
        status: Arc<InMemoryStatusBus>,
    }

    async fn fixture() -> Fixture {
        let codecs = CodecRegistry::initialize(CodecSource::None).unwrap();
        let log = EventLog::new(CausalLog::new(Arc::new(InMemoryKVStore::new())), codecs);
        log.ready().await.unwrap();
        let fixture = Fixture {
            log,
            listeners: ListenerTable::new(),
            status: Arc::new(InMemoryStatusBus::new()),
        };
        let handler = DispatchHandler::new(
            fixture.log.feed(0),
            fixture.log.clone(),
            fixture.listeners.clone(),
            Arc::clone(&fixture.status),
        );
        tokio::spawn(handler.run());
        fixture
    }

    #[tokio::test]
    async fn test_handlers_for_an_entry_finish_before_the_next() {
        let f = fixture().await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let slow_seen = Arc::clone(&seen);
        f.listeners.register(
            "A",
            Handler::Async(Arc::new(move |event: DecodedEvent, completion: Completion| {
                let seen = Arc::clone(&slow_seen);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    seen.lock().push(format!("slow:{:?}", event.payload.as_bytes()));
                    completion.done();
                });
            })),
        );
        let fast_seen = Arc::clone(&seen);
        f.listeners.register(
            "A",
            Handler::Sync(Arc::new(move |event: &DecodedEvent| -> Result<(), HandlerError> {
                fast_seen.lock().push(format!("fast:{:?}", event.payload.as_bytes()));
                Ok(())
            })),
        );

        f.log.append("A", Payload::Raw(vec![1])).await.unwrap();
        f.log.append("A", Payload::Raw(vec![2])).await.unwrap();

        timeout(Duration::from_secs(2), async {
            while seen.lock().len() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let seen = seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                "fast:Some([1])",
                "slow:Some([1])",
                "fast:Some([2])",
                "slow:Some([2])"
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_are_reported_and_dispatch_continues() {
        let f = fixture().await;
        let mut status = f.status.subscribe(StatusFilter::all());

        f.listeners.register(
            "A",
            Handler::Sync(Arc::new(|_: &DecodedEvent| -> Result<(), HandlerError> {
                panic!("boom")
            })),
        );
        f.listeners.register(
            "A",
            Handler::Async(Arc::new(|_: DecodedEvent, completion: Completion| {
                drop(completion);
            })),
        );
        f.listeners.register(
            "A",
            Handler::Sync(Arc::new(|_: &DecodedEvent| -> Result<(), HandlerError> {
                Err(HandlerError::new("bad input"))
            })),
        );

        f.log.append("A", Payload::Raw(vec![])).await.unwrap();

        let mut errors = Vec::new();
        while errors.len() < 3 {
            match timeout(Duration::from_secs(2), status.recv()).await.unwrap() {
                Some(StatusEvent::HandlerError { error, .. }) => errors.push(error),
                other => panic!("unexpected status: {:?}", other),
            }
        }
        errors.sort();
        assert_eq!(
            errors,
            vec![
                "bad input",
                "listener dropped its completion",
                "listener panicked: boom"
            ]
        );
    }

    #[tokio::test]
    async fn test_undecodable_entry_reported() {
        let f = fixture().await;
        let mut status = f.status.subscribe(StatusFilter::all());

        f.log.log().append(vec![0xff, 0xff]).await.unwrap();

        let event = timeout(Duration::from_secs(2), status.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, StatusEvent::DecodeError { name: None, .. }));
    }
}
