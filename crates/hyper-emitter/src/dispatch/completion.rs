//! # Completion Signal
//!
//! Handed to asynchronous listeners. Consuming it (`done` or `fail`) releases
//! the dispatch pipeline; dropping it unused counts as a failure.

use crate::errors::HandlerError;
use tokio::sync::oneshot;

pub(crate) type CompletionReceiver = oneshot::Receiver<Result<(), HandlerError>>;

/// One-shot completion signal of an asynchronous listener.
#[derive(Debug)]
#[must_use = "dispatch stalls until the completion is signalled or dropped"]
pub struct Completion {
    tx: oneshot::Sender<Result<(), HandlerError>>,
}

impl Completion {
    pub(crate) fn new() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// The listener finished successfully.
    pub fn done(self) {
        // the pipeline may be gone after close
        let _ = self.tx.send(Ok(()));
    }

    /// The listener failed.
    pub fn fail(self, error: impl Into<HandlerError>) {
        let _ = self.tx.send(Err(error.into()));
    }

    /// Signal `done` or `fail` from a result.
    pub fn finish(self, result: Result<(), HandlerError>) {
        let _ = self.tx.send(result);
    }
}
